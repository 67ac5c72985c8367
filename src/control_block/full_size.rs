// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Estimate how many bytes of DATA-IN a SCSI command's response actually
//! needs, from whatever prefix of the response has arrived so far.
//!
//! Mirrors the per-opcode `datain` size callbacks of the reference
//! low-level SCSI layer: a handful of response formats carry their own
//! total length inside the first few bytes, so a caller only needs to
//! buffer those leading bytes before it knows how much more to expect.
//! Commands without such a self-describing prefix return 0, meaning "no
//! extra estimate available — use whatever ALLOCATION LENGTH was sent."

use crate::control_block::{inquiry::INQUIRY_OPCODE, mod_sense::MODE_SENSE_6, report_luns::REPORT_LUNS};

/// READ CAPACITY (10) opcode.
pub const READ_CAPACITY_10: u8 = 0x25;

/// Estimate the full response size in bytes, given the CDB that was sent
/// and however many leading bytes of the response are available so far.
///
/// Returns `None` when `data` doesn't yet hold enough bytes to compute the
/// estimate (caller should keep reading before calling again), and
/// `Some(0)` when this opcode has no self-describing length prefix.
pub fn estimate_full_size(cdb: &[u8], data: &[u8]) -> Option<usize> {
    if cdb.is_empty() {
        return Some(0);
    }
    match cdb[0] {
        op if op == INQUIRY_OPCODE => {
            let evpd = cdb.len() > 1 && (cdb[1] & 0x01) != 0;
            if evpd {
                // VPD: byte2..4 big-endian page length, +4 header bytes.
                if data.len() < 4 {
                    return None;
                }
                let page_len = u16::from_be_bytes([data[2], data[3]]) as usize;
                Some(page_len + 4)
            } else {
                // Standard INQUIRY: byte4 = additional length, +5 bytes up to and
                // including that field.
                if data.len() < 5 {
                    return None;
                }
                Some(data[4] as usize + 5)
            }
        },
        op if op == REPORT_LUNS => {
            if data.len() < 4 {
                return None;
            }
            let lun_list_length =
                u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
            Some(lun_list_length + 8)
        },
        op if op == READ_CAPACITY_10 => Some(8),
        op if op == MODE_SENSE_6 => {
            if data.is_empty() {
                return None;
            }
            Some(data[0] as usize + 1)
        },
        _ => Some(0),
    }
}
