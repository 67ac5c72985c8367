// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use iscsi_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, enums::Digest},
    models::{
        common::{BasicHeaderSegment, Builder, HEADER_LEN},
        data_fromat::PduRequest,
        nop::request::NopOutRequest,
        opcode::{BhsOpcode, Opcode},
        text::{
            request::{TextRequest, TextRequestBuilder},
            response::TextResponse,
        },
    },
};

use crate::unit_tests::{load_fixture, parse_imm, parse_mut};

#[test]
fn test_text_request() -> Result<()> {
    let cfg =
        resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;

    let bytes = load_fixture("tests/unit_tests/fixtures/text/text_request.hex")?;
    assert!(bytes.len() > HEADER_LEN);

    let parsed_fixture: PduRequest<TextRequest> = parse_mut(&bytes, &cfg)?;

    let itt = 1;
    let ttt = NopOutRequest::DEFAULT_TAG;
    let cmd_sn = 1;
    let exp_sn = 1939077135;

    let header_builder = TextRequestBuilder::new()
        .lun(0) // builder takes u64
        .initiator_task_tag(itt)
        .target_task_tag(ttt)
        .cmd_sn(cmd_sn)
        .exp_stat_sn(exp_sn);

    let mut hdr_buf = [0u8; HEADER_LEN];
    header_builder.header.to_bhs_bytes(&mut hdr_buf)?;
    let mut builder = PduRequest::<TextRequest>::new_request(hdr_buf, &cfg);
    builder.append_data(parsed_fixture.data()?);

    let (hdr_bytes, body_bytes) = &builder.build(
        cfg.login.flow.max_recv_data_segment_length as usize,
        cfg.login.integrity.header_digest == Digest::CRC32C,
        cfg.login.integrity.data_digest == Digest::CRC32C,
    )?;

    assert_eq!(
        &hdr_bytes[..],
        &bytes[..HEADER_LEN],
        "TextRequest header mismatch"
    );
    assert_eq!(
        &body_bytes[..],
        &bytes[HEADER_LEN..],
        "TextRequest body mismatch"
    );

    let parsed_hdr_view = parsed_fixture.header_view()?;

    assert_eq!(
        builder.header_view()?.get_data_length_bytes(),
        parsed_hdr_view.get_data_length_bytes(),
        "data_segment_length mismatch"
    );

    assert_eq!(
        builder.header_view()?.get_opcode()?,
        parsed_hdr_view.get_opcode()?,
        "opcode mismatch"
    );

    Ok(())
}

#[test]
fn test_text_response() -> Result<()> {
    let cfg =
        resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;

    let bytes = load_fixture("tests/unit_tests/fixtures/text/text_response.hex")?;
    assert!(bytes.len() >= HEADER_LEN);

    let parsed = parse_imm::<TextResponse>(&bytes, &cfg)?;

    assert!(!parsed.data()?.is_empty());
    assert!(parsed.header_digest.is_none());
    assert!(parsed.data_digest.is_none());

    let hdr = parsed.header_view()?;

    let op = BhsOpcode::try_from(hdr.opcode.raw())?;
    assert_eq!(op.opcode, Opcode::TextResp, "expected TextResp opcode");

    let data_size = hdr.get_data_length_bytes();
    assert_eq!(data_size, parsed.data()?.len());

    assert_eq!(hdr.stat_sn.get(), 1939077135);
    assert_eq!(hdr.exp_cmd_sn.get(), 2);

    let expected =
        "TargetName=iqn.2025-07.com.example:target0\0TargetAddress=127.0.0.1:3260,1\0";
    let actual =
        String::from_utf8(parsed.data()?.to_vec()).context("Failed to decode TEXT data")?;
    assert_eq!(expected.to_string(), actual);

    Ok(())
}
