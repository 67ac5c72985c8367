// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, io::Read, rc::Rc, thread, time::Duration};

use anyhow::Result;
use iscsi_client_rs::{engine::create_context, models::logout::common::LogoutReason};
use serial_test::serial;

use crate::integration_tests::{
    canned::logout_response_success,
    common::{
        drive_until, load_config, reply_plain_login, recv_server_stream, spawn_loopback,
        write_pdu,
    },
};

#[test]
#[serial]
fn logout_close_session_tears_down() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.auth = iscsi_client_rs::cfg::config::AuthConfig::None;

    let (addr, rx) = spawn_loopback()?;
    let mut server = recv_server_stream(&rx)?;
    server.set_read_timeout(Some(Duration::from_secs(5)))?;

    let responder = thread::spawn(move || -> Result<()> {
        reply_plain_login(&mut server, 5)?;

        let mut discard = [0u8; 4096];
        server.read(&mut discard)?;
        write_pdu(&mut server, logout_response_success(0, 3, 3), &[])?;
        Ok(())
    });

    let mut ctx = create_context(cfg);
    let logged_in = Rc::new(Cell::new(false));
    {
        let logged_in = Rc::clone(&logged_in);
        ctx.full_connect(
            addr,
            Box::new(move |res| {
                if res.is_ok() {
                    logged_in.set(true);
                }
            }),
        )?;
    }
    drive_until(&mut ctx, Duration::from_secs(5), || logged_in.get())?;

    let logged_out = Rc::new(Cell::new(false));
    {
        let logged_out = Rc::clone(&logged_out);
        ctx.logout(
            LogoutReason::CloseSession,
            Box::new(move |_outcome| logged_out.set(true)),
        )?;
    }

    drive_until(&mut ctx, Duration::from_secs(5), || logged_out.get())?;
    responder.join().expect("responder thread panicked")?;

    assert!(logged_out.get(), "expected logout to complete");
    assert!(!ctx.is_logged_in());
    assert!(ctx.get_fd().is_none(), "transport should be torn down after logout");

    Ok(())
}
