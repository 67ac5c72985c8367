// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::Cell, io::Read, rc::Rc, thread, time::Duration};

use anyhow::Result;
use iscsi_client_rs::engine::create_context;
use serial_test::serial;

use crate::integration_tests::{
    canned::scsi_command_response_good,
    common::{
        drive_until, get_lun, load_config, reply_plain_login, recv_server_stream,
        spawn_loopback, write_pdu,
    },
};

#[test]
#[serial]
fn test_unit_ready_completes() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.auth = iscsi_client_rs::cfg::config::AuthConfig::None;

    let (addr, rx) = spawn_loopback()?;
    let mut server = recv_server_stream(&rx)?;
    server.set_read_timeout(Some(Duration::from_secs(5)))?;

    let responder = thread::spawn(move || -> Result<()> {
        reply_plain_login(&mut server, 3)?;

        // Drain the TEST UNIT READY command, reply GOOD.
        let mut discard = [0u8; 4096];
        server.read(&mut discard)?;
        write_pdu(&mut server, scsi_command_response_good(0, 3, 3), &[])?;
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

    let completed = Rc::new(Cell::new(false));
    let good = Rc::new(Cell::new(false));
    {
        let completed = Rc::clone(&completed);
        let good = Rc::clone(&good);
        ctx.test_unit_ready(
            get_lun(),
            Box::new(move |outcome| {
                good.set(outcome.status == iscsi_client_rs::engine::inflight::STATUS_GOOD);
                completed.set(true);
            }),
        )?;
    }

    drive_until(&mut ctx, Duration::from_secs(5), || completed.get())?;
    responder.join().expect("responder thread panicked")?;

    assert!(good.get(), "expected TEST UNIT READY to complete GOOD");

    Ok(())
}
