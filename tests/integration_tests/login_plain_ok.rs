// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, rc::Rc, thread, time::Duration};

use anyhow::Result;
use iscsi_client_rs::engine::create_context;
use serial_test::serial;

use crate::integration_tests::common::{
    drive_until, load_config, recv_server_stream, reply_plain_login, spawn_loopback,
};

#[test]
#[serial]
fn login_plain_reaches_full_feature() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.auth = iscsi_client_rs::cfg::config::AuthConfig::None;

    let (addr, rx) = spawn_loopback()?;
    let mut server = recv_server_stream(&rx)?;
    server.set_read_timeout(Some(Duration::from_secs(5)))?;

    let responder = thread::spawn(move || reply_plain_login(&mut server, 7));

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

    assert!(logged_in.get(), "expected login to succeed");
    assert!(!failed.get());
    assert!(ctx.is_logged_in());

    Ok(())
}
