// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hand-built wire bytes for the response PDUs a scripted loopback target
//! sends back. Each helper starts from a zeroed header (every response BHS
//! here carries private reserved fields, so struct-literal/update syntax
//! can't be used outside the defining module) and fills in only the fields
//! that matter, then returns the 48-byte BHS ready to write to the socket.

use iscsi_client_rs::models::{
    async_msg::response::AsyncMessage,
    command::{response::ScsiCommandResponse, zero_copy::RawScsiStatus},
    common::{BasicHeaderSegment, HEADER_LEN},
    logout::{
        common::{LogoutResponseCode, RawLogoutResponseCode},
        response::LogoutResponse,
    },
    login::{
        response::LoginResponse,
        status::{RawStatusClass, RawStatusDetail},
    },
    nop::response::NopInResponse,
    opcode::{Opcode, RawBhsOpcode},
    task_mgmt::{common::RawTaskMgmtResponseCode, response::TaskMgmtResponse},
};
use zerocopy::{FromBytes as ZFromBytes, IntoBytes, U16, U32, U64};

fn header_bytes<T: IntoBytes + zerocopy::Immutable>(header: &T) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf.copy_from_slice(header.as_bytes());
    buf
}

pub fn login_response_success(
    itt: u32,
    tsih: u16,
    stat_sn: u32,
    exp_cmd_sn: u32,
) -> [u8; HEADER_LEN] {
    let mut header = LoginResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::LoginResp as u8);
    header.tsih = U16::new(tsih);
    header.initiator_task_tag = itt;
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header.status_class = RawStatusClass::from_raw(0);
    header.status_detail = RawStatusDetail::from_raw(0);
    header_bytes(&header)
}

/// A Login(Security) Response carrying a CHAP_I/CHAP_C challenge as its text
/// data segment.
pub fn login_response_chap_challenge(
    itt: u32,
    stat_sn: u32,
    exp_cmd_sn: u32,
    chap_id: u8,
    chap_c_hex: &str,
) -> ([u8; HEADER_LEN], Vec<u8>) {
    let data = format!("CHAP_I={chap_id}\0CHAP_C=0x{chap_c_hex}\0").into_bytes();
    let mut header = LoginResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::LoginResp as u8);
    header.initiator_task_tag = itt;
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header.status_class = RawStatusClass::from_raw(0);
    header.status_detail = RawStatusDetail::from_raw(0);
    header.set_data_length_bytes(data.len() as u32);
    (header_bytes(&header), data)
}

pub fn login_response_rejected(itt: u32, class: u8, detail: u8) -> [u8; HEADER_LEN] {
    let mut header = LoginResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::LoginResp as u8);
    header.initiator_task_tag = itt;
    header.status_class = RawStatusClass::from_raw(class);
    header.status_detail = RawStatusDetail::from_raw(detail);
    header_bytes(&header)
}

pub fn nop_in_response(itt: u32, stat_sn: u32, exp_cmd_sn: u32) -> [u8; HEADER_LEN] {
    let mut header = NopInResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::NopIn as u8);
    header.initiator_task_tag = itt;
    header.target_task_tag = U32::new(0xffff_ffff);
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header_bytes(&header)
}

pub fn nop_in_unsolicited(ttt: u32, stat_sn: u32, exp_cmd_sn: u32) -> [u8; HEADER_LEN] {
    let mut header = NopInResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::NopIn as u8);
    header.initiator_task_tag = 0xffff_ffff;
    header.target_task_tag = U32::new(ttt);
    header.lun = U64::new(0);
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header_bytes(&header)
}

pub fn scsi_command_response_good(
    itt: u32,
    stat_sn: u32,
    exp_cmd_sn: u32,
) -> [u8; HEADER_LEN] {
    let mut header = ScsiCommandResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::ScsiCommandResp as u8);
    header.status = RawScsiStatus::new_raw(0);
    header.initiator_task_tag = itt;
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header_bytes(&header)
}

pub fn logout_response_success(itt: u32, stat_sn: u32, exp_cmd_sn: u32) -> [u8; HEADER_LEN] {
    let mut header = LogoutResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::LogoutResp as u8);
    header.response = RawLogoutResponseCode::from(LogoutResponseCode::Success);
    header.initiator_task_tag = itt;
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header_bytes(&header)
}

pub fn task_mgmt_response_complete(itt: u32, stat_sn: u32, exp_cmd_sn: u32) -> [u8; HEADER_LEN] {
    let mut header = TaskMgmtResponse::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::ScsiTaskMgmtResp as u8);
    header.response = RawTaskMgmtResponseCode::default(); // FunctionComplete
    header.initiator_task_tag = itt;
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header_bytes(&header)
}

pub fn async_connection_terminated(stat_sn: u32, exp_cmd_sn: u32) -> [u8; HEADER_LEN] {
    let mut header = AsyncMessage::new_zeroed();
    header.opcode = RawBhsOpcode::from_raw(Opcode::Async as u8);
    header.stat_sn = U32::new(stat_sn);
    header.exp_cmd_sn = U32::new(exp_cmd_sn);
    header.max_cmd_sn = U32::new(exp_cmd_sn + 16);
    header.async_event = 1; // ConnectionTerminated
    header_bytes(&header)
}
