// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_client_rs::{
    cfg::{cli::resolve_config_path, config::Config},
    models::{
        common::{BasicHeaderSegment, Builder, HEADER_LEN},
        data_fromat::PduRequest,
        nop::{request::NopOutRequest, response::NopInResponse},
        opcode::{BhsOpcode, Opcode},
    },
};

use crate::unit_tests::{load_fixture, parse_imm, parse_mut};

#[test]
fn test_nop_out_minimal() -> Result<()> {
    let cfg =
        resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;

    let bytes = load_fixture("tests/unit_tests/fixtures/nop/nop_out_request.hex")?;
    assert!(bytes.len() >= HEADER_LEN);

    let parsed: PduRequest<NopOutRequest> = parse_mut(&bytes, &cfg)?;
    assert!(parsed.data()?.is_empty());
    assert!(parsed.header_digest.is_none());
    assert!(parsed.data_digest.is_none());

    let itt = 1;
    let ttt = NopOutRequest::DEFAULT_TAG;
    let cmd_sn = 0;
    let exp_sn = 1;

    let header_builder = iscsi_client_rs::models::nop::request::NopOutRequestBuilder::new()
        .lun(0)
        .initiator_task_tag(itt)
        .target_task_tag(ttt)
        .cmd_sn(cmd_sn)
        .exp_stat_sn(exp_sn)
        .immediate();

    let mut header_buf = [0u8; HEADER_LEN];
    header_builder.header.to_bhs_bytes(&mut header_buf)?;

    let mut builder = PduRequest::<NopOutRequest>::new_request(header_buf, &cfg);

    let (hdr_bytes, body) = &builder.build(
        cfg.login.flow.max_recv_data_segment_length as usize,
        cfg.login.integrity.header_digest == iscsi_client_rs::cfg::enums::Digest::CRC32C,
        cfg.login.integrity.data_digest == iscsi_client_rs::cfg::enums::Digest::CRC32C,
    )?;

    assert!(body.is_empty(), "NOP-Out payload must be empty");
    assert_eq!(hdr_bytes, &parsed.header_buf, "NOP-OUT ping header mismatch");

    Ok(())
}

#[test]
fn test_nop_in_parse() -> Result<()> {
    let cfg =
        resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;

    let bytes = load_fixture("tests/unit_tests/fixtures/nop/nop_in_response.hex")?;
    assert!(bytes.len() >= HEADER_LEN);

    let parsed = parse_imm::<NopInResponse>(&bytes, &cfg)?;
    assert!(parsed.data()?.is_empty());
    assert!(parsed.header_digest.is_none());
    assert!(parsed.data_digest.is_none());

    let header = parsed.header_view()?;
    let op = BhsOpcode::try_from(header.opcode.raw())?;
    assert_eq!(op.opcode, Opcode::NopIn, "expected NOP-IN opcode 0x20");

    assert_eq!(header.stat_sn.get(), 3699214689);
    assert_eq!(header.exp_cmd_sn.get(), 191);

    Ok(())
}
