// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Synchronous Login(Security)/Operational negotiator.
//!
//! Unlike the old async `handlers::login_chap`, this type holds no
//! connection of its own: the engine feeds it Login Responses as they
//! arrive and queues whatever request it hands back.

use anyhow::Result;
use md5::{Digest as Md5Digest, Md5};

use crate::{
    cfg::config::{
        AuthConfig, Config, login_keys_chap_response, login_keys_operational,
        login_keys_security,
    },
    error::IscsiError,
    models::{
        common::Builder as _,
        data_fromat::{PDUWithData, PduRequest},
        login::{
            common::Stage,
            request::{LoginRequest, LoginRequestBuilder},
            response::LoginResponse,
            status::StatusClass,
        },
    },
};

const LOGIN_ITT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Security,
    ChapA,
    ChapAnswer,
    Operational,
    Done,
}

fn step_name(step: Step) -> &'static str {
    match step {
        Step::Security => "security",
        Step::ChapA => "chap_a",
        Step::ChapAnswer => "chap_answer",
        Step::Operational => "operational",
        Step::Done => "done",
    }
}

fn chap_credentials(cfg: &Config) -> Result<(&str, &[u8])> {
    match &cfg.login.auth {
        AuthConfig::Chap(c) => Ok((c.username.as_str(), c.secret.as_bytes())),
        AuthConfig::None => {
            Err(IscsiError::LoginRejected {
                stage: "chap_answer",
                reason: "target requires CHAP but no credentials are configured".into(),
            }
            .into())
        },
    }
}

fn calc_chap_r_hex(id: u8, secret: &[u8], challenge: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update([id]);
    hasher.update(secret);
    hasher.update(challenge);
    let digest = hasher.finalize();
    let mut s = String::with_capacity(2 + digest.len() * 2);
    s.push_str("0x");
    for b in digest {
        use core::fmt::Write;
        write!(&mut s, "{b:02X}").unwrap();
    }
    s
}

fn parse_chap_challenge(txt_bytes: &[u8]) -> Result<(u8, Vec<u8>)> {
    let txt = String::from_utf8(txt_bytes.to_vec())?;
    let mut chap_i: Option<u8> = None;
    let mut chap_c_hex: Option<String> = None;

    for kv in txt.split_terminator('\x00') {
        let mut parts = kv.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some("CHAP_I"), Some(v)) => chap_i = Some(v.trim().parse()?),
            (Some("CHAP_C"), Some(s)) => {
                let s = s.trim();
                let s = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                chap_c_hex = Some(s.to_string());
            },
            _ => {},
        }
    }

    let id = chap_i.ok_or_else(|| anyhow::anyhow!("missing CHAP_I"))?;
    let hex = chap_c_hex.ok_or_else(|| anyhow::anyhow!("missing CHAP_C"))?;
    if hex.len() % 2 != 0 {
        anyhow::bail!("CHAP_C hex length must be even, got {}", hex.len());
    }
    let chal = hex::decode(&hex)
        .map_err(|e| anyhow::anyhow!("failed to decode CHAP_C: {hex}: {e}"))?;
    Ok((id, chal))
}

fn build_request(header: LoginRequest, cfg: &Config, data: &[u8]) -> PduRequest<LoginRequest> {
    let mut buf = [0u8; crate::models::common::HEADER_LEN];
    header
        .to_bhs_bytes(&mut buf)
        .expect("LoginRequest header serializes into HEADER_LEN bytes");
    let mut pdu = PDUWithData::<LoginRequest, _>::new_request(buf, cfg);
    pdu.append_data(data);
    pdu
}

/// Drives a single connection through Login(Security)+Operational
/// negotiation up to FullFeaturePhase.
pub struct LoginNegotiator {
    cid: u16,
    isid: [u8; 6],
    tsih: u16,
    step: Step,
    uses_chap: bool,
}

impl LoginNegotiator {
    pub fn new(cfg: &Config, isid: [u8; 6], cid: u16) -> Self {
        let uses_chap = matches!(cfg.login.auth, AuthConfig::Chap(_));
        Self { cid, isid, tsih: 0, step: Step::Security, uses_chap }
    }

    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    /// First Login Request PDU to send (the Security-phase request).
    pub fn first_request(&self, cfg: &Config) -> PduRequest<LoginRequest> {
        let nsg = if self.uses_chap { Stage::Security } else { Stage::Operational };
        let mut builder = LoginRequestBuilder::new(self.isid, self.tsih)
            .csg(Stage::Security)
            .nsg(nsg)
            .initiator_task_tag(LOGIN_ITT)
            .connection_id(self.cid)
            .cmd_sn(0)
            .exp_stat_sn(0);
        if !self.uses_chap {
            builder = builder.transit();
        }
        build_request(builder.header, cfg, &login_keys_security(cfg))
    }

    /// Feed a Login Response (header plus its decoded data segment).
    /// Returns the next request to send, or `None` once FullFeature has
    /// been reached.
    pub fn on_response(
        &mut self,
        cfg: &Config,
        resp: &LoginResponse,
        data: &[u8],
    ) -> Result<Option<PduRequest<LoginRequest>>> {
        if self.step == Step::Done {
            return Ok(None);
        }

        let class = resp.status_class.decode();
        if !matches!(class, StatusClass::Success) {
            let detail = resp.status_detail.decode_with_class(class).ok();
            return Err(IscsiError::LoginRejected {
                stage: step_name(self.step),
                reason: detail
                    .map(|d| format!("{d:?}"))
                    .unwrap_or_else(|| format!("{class:?}")),
            }
            .into());
        }

        self.tsih = resp.tsih.get();
        let itt = resp.initiator_task_tag;
        let cmd_sn = resp.exp_cmd_sn.get();
        let exp_stat_sn = resp.stat_sn.get().wrapping_add(1);

        match self.step {
            Step::Security => {
                if self.uses_chap {
                    self.step = Step::ChapA;
                    let header = LoginRequestBuilder::new(self.isid, self.tsih)
                        .csg(Stage::Security)
                        .nsg(Stage::Security)
                        .initiator_task_tag(itt)
                        .connection_id(self.cid)
                        .cmd_sn(cmd_sn)
                        .exp_stat_sn(exp_stat_sn)
                        .header;
                    Ok(Some(build_request(header, cfg, b"CHAP_A=5\x00")))
                } else {
                    self.step = Step::Operational;
                    let header = LoginRequestBuilder::new(self.isid, self.tsih)
                        .transit()
                        .csg(Stage::Operational)
                        .nsg(Stage::FullFeature)
                        .versions(resp.version_max, resp.version_active)
                        .initiator_task_tag(itt)
                        .connection_id(self.cid)
                        .cmd_sn(cmd_sn)
                        .exp_stat_sn(exp_stat_sn)
                        .header;
                    Ok(Some(build_request(header, cfg, &login_keys_operational(cfg))))
                }
            },
            Step::ChapA => {
                let (id, challenge) = parse_chap_challenge(data)?;
                let (user, secret) = chap_credentials(cfg)?;
                let chap_r = calc_chap_r_hex(id, secret, &challenge);
                self.step = Step::ChapAnswer;
                let header = LoginRequestBuilder::new(self.isid, self.tsih)
                    .transit()
                    .csg(Stage::Security)
                    .nsg(Stage::Operational)
                    .initiator_task_tag(itt)
                    .connection_id(self.cid)
                    .cmd_sn(cmd_sn)
                    .exp_stat_sn(exp_stat_sn)
                    .header;
                Ok(Some(build_request(header, cfg, &login_keys_chap_response(user, &chap_r))))
            },
            Step::ChapAnswer => {
                self.step = Step::Operational;
                let header = LoginRequestBuilder::new(self.isid, self.tsih)
                    .transit()
                    .csg(Stage::Operational)
                    .nsg(Stage::FullFeature)
                    .versions(resp.version_max, resp.version_active)
                    .initiator_task_tag(itt)
                    .connection_id(self.cid)
                    .cmd_sn(cmd_sn)
                    .exp_stat_sn(exp_stat_sn)
                    .header;
                Ok(Some(build_request(header, cfg, &login_keys_operational(cfg))))
            },
            Step::Operational => {
                self.step = Step::Done;
                Ok(None)
            },
            Step::Done => unreachable!("handled above"),
        }
    }
}
