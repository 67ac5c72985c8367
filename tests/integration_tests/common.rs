// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Loopback harness for the engine's synchronous, readiness-driven API.
//!
//! There is no tokio runtime and no real target here: each test binds a TCP
//! listener on `127.0.0.1`, accepts the loop-back connection on a background
//! thread, and scripts a handful of canned response PDUs onto it. `Context`
//! is driven the same way a real caller would drive it: by polling
//! `which_events`/`service` until the outcome callback fires.

use std::{
    io::Write,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use std::io::Read;

use anyhow::{Result, bail};
use iscsi_client_rs::{
    cfg::config::Config,
    engine::Context,
    models::common::HEADER_LEN,
    transport::Events,
};

use crate::integration_tests::canned::login_response_success;

pub fn test_path() -> String {
    std::env::var("TEST_CONFIG").unwrap_or_else(|_| "tests/config.yaml".into())
}

pub fn load_config() -> Result<Config> {
    let pb = std::path::PathBuf::from(test_path());
    let mut cfg = Config::load_from_file(&pb)?;
    cfg.validate_and_normalize()?;
    Ok(cfg)
}

pub fn get_lun() -> u64 {
    0
}

/// Binds a loopback listener and hands back its address together with the
/// server-side stream once a client connects.
pub fn spawn_loopback() -> Result<(SocketAddr, mpsc::Receiver<TcpStream>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            let _ = tx.send(stream);
        }
    });
    Ok((addr, rx))
}

pub fn recv_server_stream(rx: &mpsc::Receiver<TcpStream>) -> Result<TcpStream> {
    rx.recv_timeout(Duration::from_secs(5))
        .map_err(|_| anyhow::anyhow!("client never connected to the loopback listener"))
}

/// Writes one already-framed PDU (header + payload) to the server side.
pub fn write_pdu(stream: &mut TcpStream, header: [u8; HEADER_LEN], payload: &[u8]) -> Result<()> {
    stream.write_all(&header)?;
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}

/// Replies to a plain (no-CHAP) Login(Security)+Operational exchange on the
/// server side: two Login Requests come in, two success acks go out.
pub fn reply_plain_login(server: &mut TcpStream, tsih: u16) -> Result<()> {
    let mut discard = [0u8; 4096];
    server.read(&mut discard)?;
    write_pdu(server, login_response_success(0, tsih, 1, 1), &[])?;
    server.read(&mut discard)?;
    write_pdu(server, login_response_success(0, tsih, 2, 2), &[])?;
    Ok(())
}

/// Drives `ctx`'s event loop until `done()` is true or `timeout` elapses.
///
/// `Transport::service` treats `WouldBlock` as "nothing yet", so polling
/// both directions in a tight loop is a correct substitute for a real
/// epoll/kqueue reactor in tests.
pub fn drive_until(
    ctx: &mut Context,
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() > deadline {
            bail!("timed out waiting for completion");
        }
        ctx.service(Events { readable: true, writable: true })?;
        thread::sleep(Duration::from_millis(2));
    }
    Ok(())
}
