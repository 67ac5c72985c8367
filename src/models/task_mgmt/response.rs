// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use tracing::warn;
use zerocopy::{BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::{
    models::pdu_io::FromBytes,
    models::{
        common::{BasicHeaderSegment, HEADER_LEN, SendingData},
        data_fromat::ZeroCopyType,
        opcode::{BhsOpcode, Opcode, RawBhsOpcode},
        task_mgmt::common::RawTaskMgmtResponseCode,
    },
};

/// BHS for a SCSI Task Management Response PDU (opcode `ScsiTaskMgmtResp` =
/// 0x22).
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TaskMgmtResponse {
    pub opcode: RawBhsOpcode,              // 0
    pub response: RawTaskMgmtResponseCode, // 1
    reserved1: [u8; 2],                    // 2..4
    pub total_ahs_length: u8,              // 4: always 0
    pub data_segment_length: [u8; 3],      // 5..8: always 0
    reserved2: [u8; 8],                    // 8..16
    pub initiator_task_tag: u32,           // 16..20
    reserved3: [u8; 4],                    // 20..24
    pub stat_sn: U32<BigEndian>,           // 24..28
    pub exp_cmd_sn: U32<BigEndian>,        // 28..32
    pub max_cmd_sn: U32<BigEndian>,        // 32..36
    reserved4: [u8; 12],                   // 36..48
}

impl TaskMgmtResponse {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() != HEADER_LEN {
            bail!("buffer length must be {HEADER_LEN}, got {}", buf.len());
        }
        buf.copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as zerocopy::FromBytes>::mut_from_bytes(buf).map_err(|e| {
            anyhow::anyhow!("failed convert buffer TaskMgmtResponse: {e}")
        })?;
        if hdr.opcode.opcode_known() != Some(Opcode::ScsiTaskMgmtResp) {
            anyhow::bail!(
                "TaskMgmtResponse: invalid opcode 0x{:02x}",
                hdr.opcode.opcode_raw()
            );
        }
        Ok(hdr)
    }
}

impl SendingData for TaskMgmtResponse {
    fn get_final_bit(&self) -> bool {
        true
    }

    fn set_final_bit(&mut self) {
        warn!("TaskMgmt Response cannot be marked as Final");
    }

    fn get_continue_bit(&self) -> bool {
        false
    }

    fn set_continue_bit(&mut self) {
        warn!("TaskMgmt Response cannot be marked as Contine");
    }
}

impl FromBytes for TaskMgmtResponse {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        TaskMgmtResponse::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for TaskMgmtResponse {
    #[inline]
    fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        self.to_bhs_bytes(buf)
    }

    #[inline]
    fn get_opcode(&self) -> Result<BhsOpcode> {
        BhsOpcode::try_from(self.opcode.raw())
    }

    #[inline]
    fn get_initiator_task_tag(&self) -> u32 {
        self.initiator_task_tag
    }

    #[inline]
    fn get_ahs_length_bytes(&self) -> usize {
        (self.total_ahs_length as usize) * 4
    }

    #[inline]
    fn set_ahs_length_bytes(&mut self, len: u8) {
        self.total_ahs_length = len >> 2;
    }

    #[inline]
    fn get_data_length_bytes(&self) -> usize {
        u32::from_be_bytes([
            0,
            self.data_segment_length[0],
            self.data_segment_length[1],
            self.data_segment_length[2],
        ]) as usize
    }

    #[inline]
    fn set_data_length_bytes(&mut self, len: u32) {
        let be = len.to_be_bytes();
        self.data_segment_length = [be[1], be[2], be[3]];
    }

    #[inline]
    fn get_header_diggest(&self, _: bool) -> usize {
        0
    }

    #[inline]
    fn get_data_diggest(&self, _: bool) -> usize {
        0
    }
}

impl ZeroCopyType for TaskMgmtResponse {}
