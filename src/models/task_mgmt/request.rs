// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use tracing::warn;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::{
    models::pdu_io::FromBytes,
    models::{
        common::{BasicHeaderSegment, HEADER_LEN, SendingData},
        data_fromat::ZeroCopyType,
        opcode::{BhsOpcode, Opcode, RawBhsOpcode},
        task_mgmt::common::{RawTaskMgmtFlags, TaskMgmtFunction},
    },
};

/// BHS for a SCSI Task Management Request PDU (opcode `ScsiTaskMgmtReq` =
/// 0x02). Always sent with the Immediate bit set; CmdSN is not advanced.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TaskMgmtRequest {
    pub opcode: RawBhsOpcode,         // 0
    pub flags: RawTaskMgmtFlags,      // 1: bit7=1, low7=function
    reserved1: [u8; 2],               // 2..4
    pub total_ahs_length: u8,         // 4: always 0
    pub data_segment_length: [u8; 3], // 5..8: always 0
    pub lun: U64<BigEndian>,          // 8..16
    pub initiator_task_tag: u32,      // 16..20
    pub referenced_task_tag: U32<BigEndian>, // 20..24: ITT of the task being managed
    pub cmd_sn: U32<BigEndian>,       // 24..28: current CmdSN, not advanced
    pub exp_stat_sn: U32<BigEndian>,  // 28..32
    pub ref_cmd_sn: U32<BigEndian>,   // 32..36
    pub exp_data_sn: U32<BigEndian>,  // 36..40
    reserved2: [u8; 8],                // 40..48
}

impl TaskMgmtRequest {
    pub const UNASSIGNED_TAG: u32 = 0xffffffff_u32;

    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        if buf.len() != HEADER_LEN {
            bail!("buffer length must be {HEADER_LEN}, got {}", buf.len());
        }
        buf.copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as zerocopy::FromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer TaskMgmtRequest: {e}"))?;
        if hdr.opcode.opcode_known() != Some(Opcode::ScsiTaskMgmtReq) {
            anyhow::bail!(
                "TaskMgmtRequest: invalid opcode 0x{:02x}",
                hdr.opcode.opcode_raw()
            );
        }
        Ok(hdr)
    }
}

/// Builder for a **SCSI Task Management** request (opcode `0x02`).
///
/// Always immediate: the function is processed ahead of queued commands and
/// does not consume a CmdSN slot. `lun` must be the LUN that owns the
/// referenced task, not a fixed value.
#[derive(Debug, Default)]
pub struct TaskMgmtRequestBuilder {
    pub header: TaskMgmtRequest,
}

impl TaskMgmtRequestBuilder {
    pub fn new(function: TaskMgmtFunction, lun: u64, itt: u32) -> Self {
        Self {
            header: TaskMgmtRequest {
                opcode: {
                    let mut tmp = RawBhsOpcode::default();
                    tmp.set_opcode_known(Opcode::ScsiTaskMgmtReq);
                    tmp.set_i();
                    tmp
                },
                flags: {
                    let mut f = RawTaskMgmtFlags::default();
                    f.set_function(function);
                    f
                },
                lun: U64::new(lun),
                initiator_task_tag: itt,
                referenced_task_tag: U32::new(TaskMgmtRequest::UNASSIGNED_TAG),
                ..Default::default()
            },
        }
    }

    /// Set the ITT of the task this function targets (required for AbortTask).
    pub fn referenced_task_tag(mut self, ritt: u32) -> Self {
        self.header.referenced_task_tag.set(ritt);
        self
    }

    /// Set the current CmdSN (not advanced, since TMF requests are immediate).
    pub fn cmd_sn(mut self, sn: u32) -> Self {
        self.header.cmd_sn.set(sn);
        self
    }

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }

    /// Set the CmdSN of the command being aborted/reset.
    pub fn ref_cmd_sn(mut self, sn: u32) -> Self {
        self.header.ref_cmd_sn.set(sn);
        self
    }
}

impl SendingData for TaskMgmtRequest {
    fn get_final_bit(&self) -> bool {
        true
    }

    fn set_final_bit(&mut self) {
        warn!("TaskMgmt Request cannot be marked as Final");
    }

    fn get_continue_bit(&self) -> bool {
        false
    }

    fn set_continue_bit(&mut self) {
        warn!("TaskMgmt Request cannot be marked as Contine");
    }
}

impl FromBytes for TaskMgmtRequest {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        TaskMgmtRequest::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for TaskMgmtRequest {
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

impl ZeroCopyType for TaskMgmtRequest {}
