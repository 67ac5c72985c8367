// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32, U64,
};

use crate::{
    models::pdu_io::FromBytes,
    models::{
        common::{BasicHeaderSegment, HEADER_LEN, SendingData},
        data_fromat::ZeroCopyType,
        opcode::{BhsOpcode, Opcode, RawBhsOpcode},
    },
};

/// iSCSI AsyncEvent codes (RFC 7143 §10.9.1).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvent {
    /// Target requests a parameter renegotiation.
    ParamNegotiation = 0,
    /// Target is terminating this connection.
    ConnectionTerminated = 1,
    /// Target is terminating the whole session.
    SessionTerminated = 2,
    /// Target requests the initiator log out (Param1/2 carry timers).
    LogoutRequest = 3,
    /// A connection in the session was dropped (Param1/2/3 carry CID/timers).
    ConnectionDropped = 4,
    /// All connections of the session were dropped.
    SessionDropped = 5,
    /// Target needs additional negotiation before continuing.
    NegotiationNeeded = 6,
    /// Vendor-specific; SenseData carried in the Data Segment.
    VendorSpecific = 255,
    Reserved(u8),
}

impl From<u8> for AsyncEvent {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::ParamNegotiation,
            1 => Self::ConnectionTerminated,
            2 => Self::SessionTerminated,
            3 => Self::LogoutRequest,
            4 => Self::ConnectionDropped,
            5 => Self::SessionDropped,
            6 => Self::NegotiationNeeded,
            255 => Self::VendorSpecific,
            other => Self::Reserved(other),
        }
    }
}

impl From<AsyncEvent> for u8 {
    fn from(e: AsyncEvent) -> Self {
        match e {
            AsyncEvent::ParamNegotiation => 0,
            AsyncEvent::ConnectionTerminated => 1,
            AsyncEvent::SessionTerminated => 2,
            AsyncEvent::LogoutRequest => 3,
            AsyncEvent::ConnectionDropped => 4,
            AsyncEvent::SessionDropped => 5,
            AsyncEvent::NegotiationNeeded => 6,
            AsyncEvent::VendorSpecific => 255,
            AsyncEvent::Reserved(v) => v,
        }
    }
}

/// BHS for the target-initiated **Asynchronous Message** PDU (opcode 0x32).
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AsyncMessage {
    pub opcode: RawBhsOpcode,          // 0
    reserved1: [u8; 3],                // 1..4
    pub total_ahs_length: u8,          // 4
    pub data_segment_length: [u8; 3],  // 5..8
    pub lun: U64<BigEndian>,           // 8..16
    reserved2: U64<BigEndian>,         // 16..24 (ITT = 0xffffffff, reserved)
    pub stat_sn: U32<BigEndian>,       // 24..28
    pub exp_cmd_sn: U32<BigEndian>,    // 28..32
    pub max_cmd_sn: U32<BigEndian>,    // 32..36
    pub async_event: u8,               // 36
    pub async_vcode: u8,               // 37
    pub param1: U16<BigEndian>,        // 38..40
    pub param2: U16<BigEndian>,        // 40..42
    pub param3: U16<BigEndian>,        // 42..44
    reserved3: [u8; 4],                // 44..48
}

impl AsyncMessage {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() != HEADER_LEN {
            bail!("buffer length must be {HEADER_LEN}, got {}", buf.len());
        }
        buf.copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as zerocopy::FromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer AsyncMessage: {e}"))?;
        if hdr.opcode.opcode_known() != Some(Opcode::Async) {
            anyhow::bail!(
                "AsyncMessage: invalid opcode 0x{:02x}",
                hdr.opcode.opcode_raw()
            );
        }
        Ok(hdr)
    }

    /// Decoded AsyncEvent code (byte 36).
    #[inline]
    pub fn event(&self) -> AsyncEvent {
        AsyncEvent::from(self.async_event)
    }
}

impl SendingData for AsyncMessage {
    fn get_final_bit(&self) -> bool {
        true
    }

    fn set_final_bit(&mut self) {
        tracing::warn!("AsyncMessage cannot be marked as Final");
    }

    fn get_continue_bit(&self) -> bool {
        false
    }

    fn set_continue_bit(&mut self) {
        tracing::warn!("AsyncMessage cannot be marked as Continue");
    }
}

impl FromBytes for AsyncMessage {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        AsyncMessage::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for AsyncMessage {
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
        0xffff_ffff
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
}

impl ZeroCopyType for AsyncMessage {}
