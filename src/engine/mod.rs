// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Single-threaded, non-blocking iSCSI session engine.
//!
//! [`Context`] owns one [`Transport`], the CmdSN/ExpStatSN/ITT bookkeeping
//! and the [`InFlightTable`] of requests awaiting a response. Nothing here
//! spawns a thread or an executor: the caller drives the whole session
//! through [`Context::get_fd`]/[`Context::which_events`]/[`Context::service`],
//! exactly the way [`Transport`] itself expects to be driven.

pub mod commands;
pub mod inflight;
pub mod login;
pub mod session;

use std::{net::SocketAddr, os::fd::RawFd};

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{
    cfg::config::Config,
    control_block::inquiry::VpdPage,
    engine::{
        commands::Seq,
        inflight::{Callback, CommandKind, CommandOutcome, InFlightTable},
        login::LoginNegotiator,
        session::{CommandSequence, IttAllocator, UNTAGGED},
    },
    error::IscsiError,
    models::{
        async_msg::response::{AsyncEvent, AsyncMessage},
        command::response::ScsiCommandResponse,
        common::{BasicHeaderSegment, Builder as _, HEADER_LEN, SendingData},
        data::{
            request::ScsiDataOutBuilder,
            response::ScsiDataIn,
            sense_data::SenseData,
        },
        data_fromat::{PDUWithData, PduRequest, PduResponse},
        logout::{common::LogoutReason, request::LogoutRequestBuilder, response::LogoutResponse},
        nop::response::NopInResponse,
        opcode::{BhsOpcode, Opcode},
        ready_2_transfer::response::ReadyToTransfer,
        reject::{reject_description::RejectReason, response::RejectPdu},
        task_mgmt::{common::TaskMgmtFunction, request::TaskMgmtRequestBuilder, response::TaskMgmtResponse},
        text::response::TextResponse,
    },
    transport::{Events, RawPdu, Transport},
    utils::generate_isid,
};

/// Where the session currently stands relative to the Login/Full-Feature
/// state machine (RFC 7143 §5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    LoggingIn,
    FullFeature,
    LoggingOut,
}

/// One iSCSI session over one TCP connection. Owns no thread: every public
/// method either mutates local state and returns immediately, or queues a
/// PDU onto [`Transport`] for the caller's event loop to actually send.
pub struct Context {
    cfg: Config,
    transport: Option<Transport>,
    phase: SessionPhase,
    cid: u16,
    isid: [u8; 6],
    negotiator: Option<LoginNegotiator>,
    /// Set when `login()` is called while the connect handshake is still in
    /// flight; the first Login Request is sent once `service()` observes
    /// `Transport::is_connecting()` flip to `false`.
    pending_login: bool,
    seq: CommandSequence,
    itt_alloc: IttAllocator,
    inflight: InFlightTable,
    last_error: Option<String>,
    login_cb: Option<Box<dyn FnOnce(Result<()>)>>,
}

/// Builds a fresh, disconnected session context from a validated
/// configuration.
pub fn create_context(cfg: Config) -> Context {
    let (isid, _hex) = generate_isid();
    Context {
        cfg,
        transport: None,
        phase: SessionPhase::Disconnected,
        cid: 1,
        isid,
        negotiator: None,
        pending_login: false,
        seq: CommandSequence::default(),
        itt_alloc: IttAllocator::default(),
        inflight: InFlightTable::default(),
        last_error: None,
        login_cb: None,
    }
}

impl Context {
    // ---- configuration setters --------------------------------------
    //
    // All of these mutate `self.cfg` and re-validate. They only make sense
    // before `connect()`/`login()` have been called; the caller is trusted
    // not to change identity mid-session.

    pub fn set_alias(&mut self, alias: impl Into<String>) -> Result<()> {
        self.cfg.login.identity.initiator_alias = alias.into();
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_targetname(&mut self, name: impl Into<String>) -> Result<()> {
        self.cfg.login.identity.target_name = name.into();
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_session_type(&mut self, ty: crate::cfg::enums::SessionType) -> Result<()> {
        self.cfg.login.identity.session_type = ty;
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_header_digest(&mut self, digest: crate::cfg::enums::Digest) -> Result<()> {
        self.cfg.login.integrity.header_digest = digest;
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_data_digest(&mut self, digest: crate::cfg::enums::Digest) -> Result<()> {
        self.cfg.login.integrity.data_digest = digest;
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_initiator_username_pwd(
        &mut self,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<()> {
        self.cfg.login.auth = crate::cfg::config::AuthConfig::Chap(crate::cfg::config::ChapConfig {
            username: username.into(),
            secret: secret.into(),
        });
        self.cfg.validate_and_normalize().map_err(arg_invalid)
    }

    pub fn set_isid_random(&mut self) {
        let (isid, _hex) = generate_isid();
        self.isid = isid;
    }

    // ---- connection lifecycle ----------------------------------------

    pub fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let transport = Transport::connect(addr)?;
        self.transport = Some(transport);
        self.phase = SessionPhase::Connecting;
        Ok(())
    }

    /// Begin Login negotiation. If the TCP handshake is still in flight the
    /// first Login Request is deferred until `service()` sees it complete.
    pub fn login(&mut self, cb: Box<dyn FnOnce(Result<()>)>) -> Result<()> {
        if self.transport.is_none() {
            anyhow::bail!(IscsiError::ArgumentInvalid("login() called before connect()".into()));
        }
        self.negotiator = Some(LoginNegotiator::new(&self.cfg, self.isid, self.cid));
        self.login_cb = Some(cb);
        self.phase = SessionPhase::LoggingIn;

        if self.transport.as_ref().unwrap().is_connecting() {
            self.pending_login = true;
        } else {
            self.send_first_login_request()?;
        }
        Ok(())
    }

    /// Convenience: connect then login, firing `cb` once FullFeature is
    /// reached (or the attempt failed).
    pub fn full_connect(
        &mut self,
        addr: SocketAddr,
        cb: Box<dyn FnOnce(Result<()>)>,
    ) -> Result<()> {
        self.connect(addr)?;
        self.login(cb)
    }

    fn send_first_login_request(&mut self) -> Result<()> {
        self.pending_login = false;
        let req = self
            .negotiator
            .as_ref()
            .expect("send_first_login_request called without a negotiator")
            .first_request(&self.cfg);
        self.send_plain(req)
    }

    pub fn logout(
        &mut self,
        reason: LogoutReason,
        cb: Callback,
    ) -> Result<()> {
        if self.phase != SessionPhase::FullFeature {
            anyhow::bail!(IscsiError::NotLoggedIn);
        }
        if !self.inflight.is_empty() {
            anyhow::bail!(IscsiError::BusyCommandsInFlight(self.inflight.len()));
        }
        let seq = self.next_seq(true)?;
        let builder = commands::logout(reason, self.cid, seq);
        self.phase = SessionPhase::LoggingOut;
        self.send_tracked_builder(seq.itt, builder.header, CommandKind::Logout, cb)
    }

    pub fn discovery(&mut self, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi_or_discovery()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::discovery_text(&self.cfg, seq);
        self.send_tracked(seq.itt, pdu, CommandKind::Text { buffer: BytesMut::new() }, cb)
    }

    pub fn nop_out(&mut self, lun: u64, cb: Callback) -> Result<()> {
        if self.phase != SessionPhase::FullFeature {
            anyhow::bail!(IscsiError::NotLoggedIn);
        }
        let seq = self.next_seq(false)?;
        let pdu = commands::nop_out(&self.cfg, lun, seq);
        self.send_tracked(seq.itt, pdu, CommandKind::NopOut, cb)
    }

    // ---- SCSI entry points ---------------------------------------------

    pub fn test_unit_ready(&mut self, lun: u64, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::test_unit_ready(&self.cfg, lun, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn inquiry_standard(&mut self, lun: u64, allocation_len: u8, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::inquiry_standard(&self.cfg, lun, allocation_len, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn inquiry_vpd(
        &mut self,
        lun: u64,
        page: VpdPage,
        allocation_len: u8,
        cb: Callback,
    ) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::inquiry_vpd(&self.cfg, lun, page, allocation_len, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn report_luns(&mut self, allocation_len: u32, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::report_luns(&self.cfg, allocation_len, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn read_capacity10(&mut self, lun: u64, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::read_capacity10(&self.cfg, lun, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn mode_sense6(
        &mut self,
        lun: u64,
        page_code: u8,
        allocation_len: u8,
        cb: Callback,
    ) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::mode_sense6(&self.cfg, lun, page_code, allocation_len, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn synchronize_cache10(&mut self, lun: u64, cb: Callback) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::synchronize_cache10(&self.cfg, lun, seq);
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn read10(
        &mut self,
        lun: u64,
        lba: u32,
        blocks: u16,
        blocksize: u32,
        cb: Callback,
    ) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let pdu = commands::read10(&self.cfg, lun, lba, blocks, blocksize, seq)?;
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(None), cb)
    }

    pub fn write10(
        &mut self,
        lun: u64,
        lba: u32,
        blocks: u16,
        blocksize: u32,
        data: &[u8],
        cb: Callback,
    ) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(false)?;
        let (pdu, data) = commands::write10(&self.cfg, lun, lba, blocks, blocksize, data, seq)?;
        self.send_tracked(seq.itt, pdu, Self::new_scsi_kind(Some(Bytes::from(data))), cb)
    }

    pub fn task_management(
        &mut self,
        lun: u64,
        function: TaskMgmtFunction,
        referenced_itt: u32,
        ref_cmd_sn: u32,
        cb: Callback,
    ) -> Result<()> {
        self.ensure_ready_for_scsi()?;
        let seq = self.next_seq(true)?;
        let builder = commands::task_management(lun, function, referenced_itt, ref_cmd_sn, seq);
        self.send_tracked_builder(seq.itt, builder.header, CommandKind::TaskMgmt, cb)
    }

    fn new_scsi_kind(write_data: Option<Bytes>) -> CommandKind {
        CommandKind::ScsiCommand { datain: BytesMut::new(), final_status: None, write_data }
    }

    // ---- event-loop plumbing -------------------------------------------

    pub fn get_fd(&self) -> Option<RawFd> {
        self.transport.as_ref().map(Transport::fd)
    }

    pub fn which_events(&self) -> Option<Events> {
        self.transport.as_ref().map(Transport::which_events)
    }

    pub fn get_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.phase == SessionPhase::FullFeature
    }

    pub fn destroy_context(&mut self) {
        self.inflight.cancel_all();
        self.transport = None;
        self.phase = SessionPhase::Disconnected;
        self.negotiator = None;
        self.login_cb = None;
    }

    /// Drives the transport for the event directions that fired and
    /// dispatches every PDU it produced. On a transport error every
    /// in-flight command is cancelled and the session is torn down.
    pub fn service(&mut self, revents: Events) -> Result<()> {
        let was_connecting = self
            .transport
            .as_ref()
            .map(Transport::is_connecting)
            .unwrap_or(false);

        let pdus = match self.transport.as_mut() {
            Some(t) => match t.service(revents) {
                Ok(pdus) => pdus,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    self.inflight.cancel_all();
                    self.phase = SessionPhase::Disconnected;
                    self.transport = None;
                    if let Some(cb) = self.login_cb.take() {
                        cb(Err(anyhow::anyhow!("{e}")));
                    }
                    return Err(e);
                },
            },
            None => return Ok(()),
        };

        if was_connecting
            && !self.transport.as_ref().map(Transport::is_connecting).unwrap_or(true)
            && self.pending_login
        {
            self.send_first_login_request()?;
        }

        for raw in pdus {
            if let Err(e) = self.dispatch(raw) {
                warn!("dropping malformed inbound PDU: {e}");
            }
        }
        Ok(())
    }

    // ---- internal helpers ------------------------------------------------

    fn next_seq(&mut self, immediate: bool) -> Result<Seq> {
        let itt = self.itt_alloc.alloc(&self.inflight)?;
        let cmd_sn = self.seq.next_cmd_sn(immediate);
        let exp_stat_sn = self.seq.exp_stat_sn();
        Ok(Seq { itt, cmd_sn, exp_stat_sn })
    }

    fn negotiated_digests(&self) -> (bool, bool) {
        if self.phase != SessionPhase::FullFeature {
            return (false, false);
        }
        (
            self.cfg.login.integrity.header_digest == crate::cfg::enums::Digest::CRC32C,
            self.cfg.login.integrity.data_digest == crate::cfg::enums::Digest::CRC32C,
        )
    }

    fn transport_mut(&mut self) -> Result<&mut Transport> {
        self.transport
            .as_mut()
            .ok_or_else(|| IscsiError::ProtocolViolation("no active transport".into()).into())
    }

    fn ensure_ready_for_scsi(&self) -> Result<()> {
        if self.phase != SessionPhase::FullFeature {
            anyhow::bail!(IscsiError::NotLoggedIn);
        }
        if !self.cfg.login.identity.session_type.is_normal() {
            anyhow::bail!(IscsiError::ProtocolViolation(
                "SCSI commands require a Normal session".into()
            ));
        }
        Ok(())
    }

    fn ensure_ready_for_scsi_or_discovery(&self) -> Result<()> {
        if self.phase != SessionPhase::FullFeature {
            anyhow::bail!(IscsiError::NotLoggedIn);
        }
        Ok(())
    }

    /// Sends a PDU nobody is waiting on a reply to be matched against an
    /// entry in the in-flight table (Login requests and R2T-driven
    /// Data-Out chunks).
    fn send_plain<T>(&mut self, mut pdu: PduRequest<T>) -> Result<()>
    where T: BasicHeaderSegment + SendingData + crate::models::pdu_io::FromBytes + crate::models::data_fromat::ZeroCopyType {
        let (hd, dd) = self.negotiated_digests();
        let max_recv = self.cfg.login.flow.max_recv_data_segment_length as usize;
        let (header, body) = pdu.build(max_recv, hd, dd)?;
        self.transport_mut()?.queue_pdu(header, Bytes::from(body));
        Ok(())
    }

    fn send_tracked<T>(
        &mut self,
        itt: u32,
        mut pdu: PduRequest<T>,
        kind: CommandKind,
        cb: Callback,
    ) -> Result<()>
    where T: BasicHeaderSegment + SendingData + crate::models::pdu_io::FromBytes + crate::models::data_fromat::ZeroCopyType {
        let (hd, dd) = self.negotiated_digests();
        let max_recv = self.cfg.login.flow.max_recv_data_segment_length as usize;
        let (header, body) = pdu.build(max_recv, hd, dd)?;
        let body = Bytes::from(body);
        self.inflight.insert_resendable(itt, kind, cb, header, body.clone());
        self.transport_mut()?.queue_pdu(header, body);
        Ok(())
    }

    /// Same as [`Self::send_tracked`], but for the Task Management/Logout
    /// builders in [`commands`] that hand back a raw header instead of a
    /// ready-to-send [`PduRequest`].
    fn send_tracked_builder<T>(
        &mut self,
        itt: u32,
        header: T,
        kind: CommandKind,
        cb: Callback,
    ) -> Result<()>
    where T: BasicHeaderSegment + SendingData + crate::models::pdu_io::FromBytes + crate::models::data_fromat::ZeroCopyType {
        let mut buf = [0u8; HEADER_LEN];
        header.to_bhs_bytes(&mut buf)?;
        let pdu = PDUWithData::<T, BytesMut>::new_request(buf, &self.cfg);
        self.send_tracked(itt, pdu, kind, cb)
    }

    fn dispatch(&mut self, raw: RawPdu) -> Result<()> {
        let opcode = BhsOpcode::try_from(raw.header[0])?.opcode;
        let mut header_buf = [0u8; HEADER_LEN];
        header_buf.copy_from_slice(&raw.header);
        let (hd, dd) = self.negotiated_digests_for_inbound();

        match opcode {
            Opcode::LoginResp => self.on_login_response(header_buf, raw.payload),
            Opcode::ScsiCommandResp => self.on_scsi_command_response(header_buf, raw.payload, hd, dd),
            Opcode::ScsiDataIn => self.on_scsi_data_in(header_buf, raw.payload, hd, dd),
            Opcode::ReadyToTransfer => self.on_ready_to_transfer(header_buf, raw.payload, hd, dd),
            Opcode::NopIn => self.on_nop_in(header_buf, raw.payload, hd, dd),
            Opcode::LogoutResp => self.on_logout_response(header_buf, raw.payload, hd, dd),
            Opcode::ScsiTaskMgmtResp => self.on_task_mgmt_response(header_buf, raw.payload, hd, dd),
            Opcode::TextResp => self.on_text_response(header_buf, raw.payload, hd, dd),
            Opcode::Reject => self.on_reject(header_buf, raw.payload, hd, dd),
            Opcode::Async => self.on_async(header_buf, raw.payload, hd, dd),
            other => {
                warn!("unexpected inbound opcode {other:?}, dropping PDU");
                Ok(())
            },
        }
    }

    /// Login PDUs are never digested (RFC 7143 §10.12): use the cfg-level
    /// intent only once FullFeature, same as outbound.
    fn negotiated_digests_for_inbound(&self) -> (bool, bool) {
        self.negotiated_digests()
    }

    fn on_login_response(&mut self, header_buf: [u8; HEADER_LEN], payload: Bytes) -> Result<()> {
        use crate::models::login::response::LoginResponse;
        let mut pdu = PduResponse::<LoginResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, false, false)?;
        let header = *pdu.header_view()?;
        let data = pdu.data()?.to_vec();

        let mut negotiator = match self.negotiator.take() {
            Some(n) => n,
            None => {
                warn!("login response with no negotiator in flight, dropping");
                return Ok(());
            },
        };

        match negotiator.on_response(&self.cfg, &header, &data) {
            Ok(Some(next)) => {
                self.negotiator = Some(negotiator);
                self.send_plain(next)
            },
            Ok(None) => {
                self.seq.sync_from_login(header.exp_cmd_sn.get(), header.stat_sn.get());
                if let Some(t) = self.transport.as_mut() {
                    t.set_digests(
                        self.cfg.login.integrity.header_digest == crate::cfg::enums::Digest::CRC32C,
                        self.cfg.login.integrity.data_digest == crate::cfg::enums::Digest::CRC32C,
                    );
                }
                self.phase = SessionPhase::FullFeature;
                if let Some(cb) = self.login_cb.take() {
                    cb(Ok(()));
                }
                Ok(())
            },
            Err(e) => {
                self.phase = SessionPhase::Disconnected;
                if let Some(cb) = self.login_cb.take() {
                    cb(Err(anyhow::anyhow!("{e}")));
                }
                Err(e)
            },
        }
    }

    fn on_scsi_command_response(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<ScsiCommandResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());

        let status = header.status.decode();
        let data = pdu.data()?.to_vec();

        let pending = match self.inflight.get_mut(itt) {
            Some(p) => p,
            None => {
                warn!("SCSI Command Response for unknown itt={itt}");
                return Ok(());
            },
        };
        let datain = match &mut pending.kind {
            CommandKind::ScsiCommand { datain, .. } => std::mem::take(datain),
            _ => BytesMut::new(),
        };

        let outcome = match status {
            Ok(crate::models::command::common::ScsiStatus::Good) => {
                CommandOutcome::good(if datain.is_empty() { Bytes::from(data) } else { datain.freeze() })
            },
            Ok(crate::models::command::common::ScsiStatus::CheckCondition) => {
                match SenseData::parse(&data) {
                    Ok(sense) => CommandOutcome::check_condition(sense),
                    Err(e) => {
                        warn!("failed to parse CHECK CONDITION sense data: {e}");
                        CommandOutcome::error()
                    },
                }
            },
            _ => CommandOutcome::error(),
        };
        self.inflight.complete(itt, outcome);
        Ok(())
    }

    fn on_scsi_data_in(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<ScsiDataIn>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn_or_rsvd.get());

        let real_final = header.get_real_final_bit();
        let status_piggybacked = header.get_status_bit();
        let scsi_status = header.scsi_status();
        let chunk = pdu.data()?.to_vec();

        let pending = match self.inflight.get_mut(itt) {
            Some(p) => p,
            None => {
                warn!("SCSI Data-In for unknown itt={itt}");
                return Ok(());
            },
        };
        let CommandKind::ScsiCommand { datain, .. } = &mut pending.kind else {
            warn!("SCSI Data-In for itt={itt} that is not a SCSI command");
            return Ok(());
        };
        datain.extend_from_slice(&chunk);

        if real_final && status_piggybacked {
            let outcome = match scsi_status {
                Some(crate::models::command::common::ScsiStatus::Good) | None => {
                    let bytes = std::mem::take(datain).freeze();
                    CommandOutcome::good(bytes)
                },
                Some(crate::models::command::common::ScsiStatus::CheckCondition) => {
                    CommandOutcome::check_condition(SenseData::default())
                },
                Some(_) => CommandOutcome::error(),
            };
            self.inflight.complete(itt, outcome);
        }
        Ok(())
    }

    fn on_ready_to_transfer(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<ReadyToTransfer>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());
        let ttt = header.target_transfer_tag.get();
        let buffer_offset = header.buffer_offset.get();
        let desired_len = header.desired_data_transfer_length.get();

        let write_data = match self.inflight.get_mut(itt) {
            Some(p) => match &mut p.kind {
                CommandKind::ScsiCommand { write_data, .. } => write_data.take(),
                _ => None,
            },
            None => {
                warn!("R2T for unknown itt={itt}");
                return Ok(());
            },
        };
        let Some(write_data) = write_data else {
            warn!("R2T for itt={itt} with no pending write data (already sent or not a WRITE)");
            return Ok(());
        };

        let start = buffer_offset as usize;
        let end = (start + desired_len as usize).min(write_data.len());
        let chunk = write_data.slice(start..end);

        let data_out_header = ScsiDataOutBuilder::new()
            .initiator_task_tag(itt)
            .target_transfer_tag(ttt)
            .buffer_offset(buffer_offset)
            .data_sn(0)
            .exp_stat_sn(self.seq.exp_stat_sn())
            .header;

        let mut buf = [0u8; HEADER_LEN];
        data_out_header.to_bhs_bytes(&mut buf)?;
        self.send_data_out(buf, &chunk)
    }

    fn send_data_out(&mut self, header_buf: [u8; HEADER_LEN], chunk: &[u8]) -> Result<()> {
        let mut pdu = PDUWithData::<crate::models::data::request::ScsiDataOut, BytesMut>::new_request(
            header_buf, &self.cfg,
        );
        pdu.append_data(chunk);
        pdu.header_view_mut()?.set_final_bit();
        self.send_plain(pdu)
    }

    fn on_nop_in(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<NopInResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());

        if itt == UNTAGGED {
            // Unsolicited ping from the target: echo its TTT back immediately.
            let ttt = header.target_task_tag.get();
            let seq = self.next_seq(false)?;
            let reply = crate::models::nop::request::NopOutRequestBuilder::new()
                .initiator_task_tag(UNTAGGED)
                .target_task_tag(ttt)
                .cmd_sn(seq.cmd_sn)
                .exp_stat_sn(seq.exp_stat_sn)
                .header;
            let mut buf = [0u8; HEADER_LEN];
            reply.to_bhs_bytes(&mut buf)?;
            let pdu = PDUWithData::<crate::models::nop::request::NopOutRequest, BytesMut>::new_request(
                buf, &self.cfg,
            );
            return self.send_plain(pdu);
        }

        let data = pdu.data()?.to_vec();
        self.inflight.complete(itt, CommandOutcome::good(Bytes::from(data)));
        Ok(())
    }

    fn on_logout_response(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<LogoutResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());

        let code = header.response.decode();
        let outcome = match code {
            Ok(crate::models::logout::common::LogoutResponseCode::Success) => {
                CommandOutcome::good(Bytes::new())
            },
            _ => CommandOutcome::error(),
        };
        self.phase = SessionPhase::Disconnected;
        self.inflight.complete(itt, outcome);
        self.transport = None;
        Ok(())
    }

    fn on_task_mgmt_response(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<TaskMgmtResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());

        let code = header.response.decode();
        let outcome = match code {
            Ok(crate::models::task_mgmt::common::TaskMgmtResponseCode::FunctionComplete) => {
                CommandOutcome::good(Bytes::new())
            },
            _ => CommandOutcome::error(),
        };
        self.inflight.complete(itt, outcome);
        Ok(())
    }

    fn on_text_response(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<TextResponse>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        self.seq.observe_stat_sn(header.stat_sn.get());
        let final_bit = header.get_final_bit();
        let chunk = pdu.data()?.to_vec();

        let pending = match self.inflight.get_mut(itt) {
            Some(p) => p,
            None => {
                warn!("Text Response for unknown itt={itt}");
                return Ok(());
            },
        };
        let CommandKind::Text { buffer } = &mut pending.kind else {
            warn!("Text Response for itt={itt} that is not a Text negotiation");
            return Ok(());
        };
        buffer.extend_from_slice(&chunk);

        if final_bit {
            let bytes = std::mem::take(buffer).freeze();
            self.inflight.complete(itt, CommandOutcome::good(bytes));
        } else {
            debug!("Text Response for itt={itt} continues, waiting for more");
        }
        Ok(())
    }

    fn on_reject(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<RejectPdu>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        let itt = header.get_initiator_task_tag();
        let reason = RejectReason::from_u8(header.reason.raw());

        let resendable = matches!(
            reason,
            RejectReason::ImmediateCmdReject
                | RejectReason::SnackReject
                | RejectReason::LongOpReject
                | RejectReason::DataDigestError
        );

        if resendable {
            if let Some((header, body)) = self.inflight.resend_bytes(itt) {
                self.transport_mut()?.queue_pdu(header, body);
                return Ok(());
            }
        }
        if itt != UNTAGGED {
            self.inflight.complete(itt, CommandOutcome::error());
        }
        warn!("target rejected pdu itt={itt}: {reason:?}");
        Ok(())
    }

    fn on_async(
        &mut self,
        header_buf: [u8; HEADER_LEN],
        payload: Bytes,
        hd: bool,
        dd: bool,
    ) -> Result<()> {
        let mut pdu = PduResponse::<AsyncMessage>::from_header_slice(header_buf, &self.cfg);
        pdu.parse_with_buff(&payload, hd, dd)?;
        let header = pdu.header_view()?;
        self.seq.observe_stat_sn(header.stat_sn.get());

        match header.event() {
            AsyncEvent::ConnectionTerminated | AsyncEvent::SessionTerminated => {
                self.last_error = Some(format!("{:?}", header.event()));
                self.inflight.cancel_all();
                self.phase = SessionPhase::Disconnected;
                self.transport = None;
            },
            other => {
                debug!("async message event: {other:?}");
            },
        }
        Ok(())
    }
}

fn arg_invalid(e: anyhow::Error) -> anyhow::Error {
    IscsiError::ArgumentInvalid(e.to_string()).into()
}
