// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! REPORT LUNS — CDB filler (12-byte CDB written into a 16-byte buffer).
//!
//! CDB layout (SPC):
//!   [0]  = 0xA0 (REPORT LUNS)
//!   [1]  = Service Action (0x00 for REPORT LUNS)
//!   [2]  = SELECT REPORT
//!   [3]  = reserved
//!   [4]  = reserved
//!   [5]  = reserved
//!   [6..9]  = ALLOCATION LENGTH (big-endian u32)
//!   [10] = reserved
//!   [11] = CONTROL
//!
//! Response starts with:
//!   [0..3] = LUN LIST LENGTH (big-endian u32, multiple of 8)
//!   [4..7] = reserved
//!   [8..]  = LUN entries (8 bytes each)
//!
use anyhow::{Result, bail};

pub const REPORT_LUNS: u8 = 0xA0;

/// Common SELECT REPORT values (byte 2).
pub mod select_report {
    /// All logical unit addresses.
    pub const ALL: u8 = 0x00;
    /// Well known logical unit addresses.
    pub const WELL_KNOWN: u8 = 0x01;
    /// All logical unit addresses (excluding well known) — commonly used.
    pub const ALL_MAPPED: u8 = 0x02;
}

/// Fill a REPORT LUNS CDB into `cdb[0..12]`.
#[inline]
pub fn fill_report_luns(
    cdb: &mut [u8; 16],
    select: u8,
    allocation_len: u32,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = REPORT_LUNS;
    cdb[1] = 0x00; // Service Action = REPORT LUNS
    cdb[2] = select;
    let [b6, b7, b8, b9] = allocation_len.to_be_bytes();
    cdb[6] = b6;
    cdb[7] = b7;
    cdb[8] = b8;
    cdb[9] = b9;
    cdb[11] = control;
}

/// Convenience: select=ALL, control=0.
#[inline]
pub fn fill_report_luns_simple(cdb: &mut [u8; 16], allocation_len: u32) {
    fill_report_luns(cdb, select_report::ALL, allocation_len, 0x00)
}

/// Parsed REPORT LUNS response: the reported LUN count and the LUNs
/// themselves (only the first 16 bits of each 8-byte LUN entry, which
/// covers flat and peripheral device addressing — the addressing methods
/// any target in this crate's scope actually uses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLunsResult {
    pub num: u32,
    pub luns: Vec<u16>,
}

/// Parse a REPORT LUNS response out of `buf`.
///
/// `buf` must contain at least `lun_list_length + 8` bytes — the 8-byte
/// header plus every LUN entry the header claims. A buffer holding fewer
/// bytes than that is a short read and is rejected rather than silently
/// truncated.
pub fn parse_report_luns(buf: &[u8]) -> Result<ReportLunsResult> {
    if buf.len() < 8 {
        bail!("REPORT LUNS buffer too short for header: {}", buf.len());
    }
    let lun_list_length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let needed = (lun_list_length as usize)
        .checked_add(8)
        .ok_or_else(|| anyhow::anyhow!("REPORT LUNS list length overflow"))?;
    if buf.len() < needed {
        bail!(
            "REPORT LUNS short read: header claims {} bytes of LUN data, have {}",
            lun_list_length,
            buf.len().saturating_sub(8)
        );
    }
    let num = lun_list_length / 8;
    let mut luns = Vec::with_capacity(num as usize);
    for i in 0..num as usize {
        let off = 8 + i * 8;
        luns.push(u16::from_be_bytes([buf[off], buf[off + 1]]));
    }
    Ok(ReportLunsResult { num, luns })
}
