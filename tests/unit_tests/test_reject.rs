// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use iscsi_client_rs::{
    cfg::{cli::resolve_config_path, config::Config},
    models::{
        common::HEADER_LEN,
        opcode::{BhsOpcode, Opcode},
        reject::response::RejectPdu,
    },
};

use crate::unit_tests::load_fixture;

#[test]
fn test_reject_parse() -> Result<()> {
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let bytes =
        load_fixture("tests/unit_tests/fixtures/scsi_commands/reject_example.hex")?;
    assert!(bytes.len() >= HEADER_LEN);

    let pdu = crate::unit_tests::parse_imm::<RejectPdu>(&bytes, &cfg)?;

    assert!(!pdu.data()?.is_empty());
    assert!(pdu.header_digest.is_none());
    assert!(pdu.data_digest.is_none());

    let hdr = pdu.header_view().expect("valid Reject BHS");

    let op = BhsOpcode::try_from(hdr.opcode.raw())?;
    assert_eq!(op.opcode, Opcode::Reject, "expected Reject opcode 0x3f");

    assert_eq!(hdr.stat_sn.get(), 7_781_748);
    assert_eq!(hdr.exp_cmd_sn.get(), 0);

    Ok(())
}
