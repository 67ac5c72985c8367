// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, io::Read, rc::Rc, thread, time::Duration};

use anyhow::Result;
use iscsi_client_rs::engine::create_context;
use serial_test::serial;

use crate::integration_tests::{
    canned::nop_in_response,
    common::{
        drive_until, get_lun, load_config, reply_plain_login, recv_server_stream,
        spawn_loopback, write_pdu,
    },
};

#[test]
#[serial]
fn nop_out_gets_nop_in_reply() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.auth = iscsi_client_rs::cfg::config::AuthConfig::None;

    let (addr, rx) = spawn_loopback()?;
    let mut server = recv_server_stream(&rx)?;
    server.set_read_timeout(Some(Duration::from_secs(5)))?;

    let responder = thread::spawn(move || -> Result<()> {
        reply_plain_login(&mut server, 11)?;

        let mut discard = [0u8; 4096];
        server.read(&mut discard)?;
        write_pdu(&mut server, nop_in_response(0, 3, 3), &[])?;
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

    let acked = Rc::new(Cell::new(false));
    {
        let acked = Rc::clone(&acked);
        ctx.nop_out(get_lun(), Box::new(move |_outcome| acked.set(true)))?;
    }

    drive_until(&mut ctx, Duration::from_secs(5), || acked.get())?;
    responder.join().expect("responder thread panicked")?;

    assert!(acked.get(), "expected NOP-Out to be acknowledged");

    Ok(())
}
