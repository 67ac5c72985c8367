// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI command, Task Management, Logout and Discovery request builders.
//!
//! Every function here only *constructs* a request PDU from already
//! allocated sequencing numbers; the caller (the engine's command
//! entry points) is responsible for ITT allocation, CmdSN/ExpStatSN
//! bookkeeping and enqueueing onto the transport.

use anyhow::{Result, bail};

use crate::{
    cfg::config::Config,
    control_block::{
        inquiry::{fill_inquiry_standard_simple, fill_inquiry_vpd_simple, VpdPage},
        mod_sense::fill_mode_sense6_simple,
        read::build_read10,
        read_capacity::build_read_capacity10,
        report_luns::fill_report_luns_simple,
        synchronize_cache::fill_synchronize_cache10_whole_medium,
        test_unit_ready::build_test_unit_ready,
        write::build_write10,
    },
    error::IscsiError,
    models::{
        command::{
            common::TaskAttribute,
            request::{ScsiCommandRequest, ScsiCommandRequestBuilder},
        },
        data_fromat::{PDUWithData, PduRequest},
        logout::{common::LogoutReason, request::LogoutRequestBuilder},
        nop::request::{NopOutRequest, NopOutRequestBuilder},
        task_mgmt::{common::TaskMgmtFunction, request::TaskMgmtRequestBuilder},
        text::request::TextRequestBuilder,
    },
};

/// Fresh sequencing numbers handed to every builder. Assigned by the
/// engine immediately before a request is built.
#[derive(Debug, Clone, Copy)]
pub struct Seq {
    pub itt: u32,
    pub cmd_sn: u32,
    pub exp_stat_sn: u32,
}

fn scsi_request(
    cfg: &Config,
    lun: u64,
    cdb: [u8; 16],
    read: bool,
    write: bool,
    expected_xfer_len: u32,
    seq: Seq,
) -> PduRequest<ScsiCommandRequest> {
    let mut builder = ScsiCommandRequestBuilder::new()
        .lun(lun)
        .task_attribute(TaskAttribute::Simple)
        .initiator_task_tag(seq.itt)
        .expected_data_transfer_length(expected_xfer_len)
        .cmd_sn(seq.cmd_sn)
        .exp_stat_sn(seq.exp_stat_sn)
        .scsi_descriptor_block(&cdb);
    if read {
        builder = builder.read();
    }
    if write {
        builder = builder.write();
    }
    let header = builder.header;
    let mut buf = [0u8; crate::models::common::HEADER_LEN];
    header
        .to_bhs_bytes(&mut buf)
        .expect("ScsiCommandRequest header serializes into HEADER_LEN bytes");
    PDUWithData::<ScsiCommandRequest, _>::new_request(buf, cfg)
}

pub fn test_unit_ready(cfg: &Config, lun: u64, seq: Seq) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    build_test_unit_ready(&mut cdb, 0);
    scsi_request(cfg, lun, cdb, false, false, 0, seq)
}

pub fn inquiry_standard(
    cfg: &Config,
    lun: u64,
    allocation_len: u8,
    seq: Seq,
) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    fill_inquiry_standard_simple(&mut cdb, allocation_len);
    scsi_request(cfg, lun, cdb, true, false, allocation_len as u32, seq)
}

pub fn inquiry_vpd(
    cfg: &Config,
    lun: u64,
    page: VpdPage,
    allocation_len: u8,
    seq: Seq,
) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    fill_inquiry_vpd_simple(&mut cdb, page, allocation_len);
    scsi_request(cfg, lun, cdb, true, false, allocation_len as u32, seq)
}

/// REPORT LUNS always targets LUN 0, regardless of the LUN the caller is
/// otherwise working with.
pub fn report_luns(
    cfg: &Config,
    allocation_len: u32,
    seq: Seq,
) -> PduRequest<ScsiCommandRequest> {
    let allocation_len = allocation_len.max(16);
    let mut cdb = [0u8; 16];
    fill_report_luns_simple(&mut cdb, allocation_len);
    scsi_request(cfg, 0, cdb, true, false, allocation_len, seq)
}

pub fn read_capacity10(cfg: &Config, lun: u64, seq: Seq) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    build_read_capacity10(&mut cdb, 0, false, 0);
    scsi_request(cfg, lun, cdb, true, false, 8, seq)
}

pub fn mode_sense6(
    cfg: &Config,
    lun: u64,
    page_code: u8,
    allocation_len: u8,
    seq: Seq,
) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    fill_mode_sense6_simple(&mut cdb, page_code, allocation_len);
    scsi_request(cfg, lun, cdb, true, false, allocation_len as u32, seq)
}

pub fn synchronize_cache10(cfg: &Config, lun: u64, seq: Seq) -> PduRequest<ScsiCommandRequest> {
    let mut cdb = [0u8; 16];
    fill_synchronize_cache10_whole_medium(&mut cdb);
    scsi_request(cfg, lun, cdb, false, false, 0, seq)
}

/// `expected transfer length = blocks * blocksize`; caller passes the
/// negotiated block size so the CDB/PDU stay consistent.
pub fn read10(
    cfg: &Config,
    lun: u64,
    lba: u32,
    blocks: u16,
    blocksize: u32,
    seq: Seq,
) -> Result<PduRequest<ScsiCommandRequest>> {
    let xfer_len = (blocks as u32)
        .checked_mul(blocksize)
        .ok_or_else(|| IscsiError::ArgumentInvalid("read10: transfer length overflow".into()))?;
    let mut cdb = [0u8; 16];
    build_read10(&mut cdb, lba, blocks, 0, 0);
    Ok(scsi_request(cfg, lun, cdb, true, false, xfer_len, seq))
}

/// Rejects synchronously (no PDU built, no I/O) when `data.len()` isn't an
/// exact multiple of `blocksize` or doesn't match `blocks * blocksize`.
pub fn write10(
    cfg: &Config,
    lun: u64,
    lba: u32,
    blocks: u16,
    blocksize: u32,
    data: &[u8],
    seq: Seq,
) -> Result<(PduRequest<ScsiCommandRequest>, Vec<u8>)> {
    let expected = (blocks as u32)
        .checked_mul(blocksize)
        .ok_or_else(|| IscsiError::ArgumentInvalid("write10: transfer length overflow".into()))?
        as usize;
    if data.len() != expected {
        bail!(IscsiError::ArgumentInvalid(format!(
            "write10: data length {} does not match expected transfer length {expected}",
            data.len()
        )));
    }
    if expected % blocksize as usize != 0 {
        bail!(IscsiError::ArgumentInvalid(
            "write10: transfer length is not a multiple of the block size".into()
        ));
    }
    let mut cdb = [0u8; 16];
    build_write10(&mut cdb, lba, blocks, 0, 0);
    let pdu = scsi_request(cfg, lun, cdb, false, true, expected as u32, seq);
    Ok((pdu, data.to_vec()))
}

pub fn task_management(
    lun: u64,
    function: TaskMgmtFunction,
    referenced_itt: u32,
    ref_cmd_sn: u32,
    seq: Seq,
) -> TaskMgmtRequestBuilder {
    TaskMgmtRequestBuilder::new(function, lun, seq.itt)
        .referenced_task_tag(referenced_itt)
        .cmd_sn(seq.cmd_sn)
        .exp_stat_sn(seq.exp_stat_sn)
        .ref_cmd_sn(ref_cmd_sn)
}

pub fn logout(reason: LogoutReason, cid: u16, seq: Seq) -> LogoutRequestBuilder {
    LogoutRequestBuilder::new(reason, seq.itt, cid)
        .cmd_sn(seq.cmd_sn)
        .exp_stat_sn(seq.exp_stat_sn)
}

/// `SendTargets=All` discovery request. Only valid once the session has
/// reached FullFeaturePhase.
pub fn discovery_text(cfg: &Config, seq: Seq) -> PduRequest<crate::models::text::request::TextRequest> {
    let header = TextRequestBuilder::new()
        .initiator_task_tag(seq.itt)
        .cmd_sn(seq.cmd_sn)
        .exp_stat_sn(seq.exp_stat_sn)
        .target_task_tag(0xffff_ffff)
        .header;
    let mut buf = [0u8; crate::models::common::HEADER_LEN];
    header
        .to_bhs_bytes(&mut buf)
        .expect("TextRequest header serializes into HEADER_LEN bytes");
    let mut pdu = PDUWithData::<crate::models::text::request::TextRequest, _>::new_request(
        buf, cfg,
    );
    pdu.append_data(b"SendTargets=All\x00");
    pdu
}

/// Caller-initiated NOP-Out "ping": `target_task_tag` is left as the
/// reserved sentinel so the target allocates a fresh one and replies with
/// a matching NOP-In.
pub fn nop_out(cfg: &Config, lun: u64, seq: Seq) -> PduRequest<NopOutRequest> {
    let header = NopOutRequestBuilder::new()
        .initiator_task_tag(seq.itt)
        .target_task_tag(NopOutRequest::DEFAULT_TAG)
        .cmd_sn(seq.cmd_sn)
        .exp_stat_sn(seq.exp_stat_sn)
        .header;
    let mut buf = [0u8; crate::models::common::HEADER_LEN];
    header
        .to_bhs_bytes(&mut buf)
        .expect("NopOutRequest header serializes into HEADER_LEN bytes");
    let mut pdu = PDUWithData::<NopOutRequest, _>::new_request(buf, cfg);
    let _ = lun; // NOP-Out LUN is advisory; callers typically leave it zero.
    pdu
}
