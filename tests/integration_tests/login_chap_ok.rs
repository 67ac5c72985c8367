// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, io::Read, rc::Rc, thread, time::Duration};

use anyhow::Result;
use iscsi_client_rs::{
    cfg::config::{AuthConfig, ChapConfig},
    engine::create_context,
};
use serial_test::serial;

use crate::integration_tests::{
    canned::{login_response_chap_challenge, login_response_success},
    common::{drive_until, load_config, recv_server_stream, spawn_loopback, write_pdu},
};

#[test]
#[serial]
fn login_chap_reaches_full_feature() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.auth = AuthConfig::Chap(ChapConfig {
        username: "chapuser".into(),
        secret: "chapsecret12345".into(),
    });

    let (addr, rx) = spawn_loopback()?;
    let mut server = recv_server_stream(&rx)?;
    server.set_read_timeout(Some(Duration::from_secs(5)))?;

    let responder = thread::spawn(move || -> Result<()> {
        let mut discard = [0u8; 4096];

        // Initial Security request (AuthMethod=CHAP) -> plain ack.
        server.read(&mut discard)?;
        write_pdu(&mut server, login_response_success(0, 9, 1, 1), &[])?;

        // CHAP_A=5 request -> target replies with CHAP_I/CHAP_C challenge.
        server.read(&mut discard)?;
        let (hdr, data) = login_response_chap_challenge(0, 9, 2, 7, "deadbeef");
        write_pdu(&mut server, hdr, &data)?;

        // CHAP_N/CHAP_R answer request -> plain ack.
        server.read(&mut discard)?;
        write_pdu(&mut server, login_response_success(0, 9, 3, 3), &[])?;

        // Operational request -> transit to FullFeature.
        server.read(&mut discard)?;
        write_pdu(&mut server, login_response_success(0, 9, 4, 4), &[])?;

        Ok(())
    });

    let mut ctx = create_context(cfg);
    let logged_in = Rc::new(Cell::new(false));
    let failed = Rc::new(Cell::new(false));
    {
        let logged_in = Rc::clone(&logged_in);
        let failed = Rc::clone(&failed);
        ctx.full_connect(
            addr,
            Box::new(move |res| match res {
                Ok(()) => logged_in.set(true),
                Err(_) => failed.set(true),
            }),
        )?;
    }

    drive_until(&mut ctx, Duration::from_secs(5), || {
        logged_in.get() || failed.get()
    })?;

    responder.join().expect("responder thread panicked")?;

    assert!(logged_in.get(), "expected CHAP login to succeed");
    assert!(!failed.get());
    assert!(ctx.is_logged_in());

    Ok(())
}
