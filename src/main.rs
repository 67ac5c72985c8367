// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    cell::RefCell,
    net::{SocketAddr, ToSocketAddrs},
    rc::Rc,
};

use anyhow::{Context as _, Result};
use iscsi_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    engine::{Context, create_context, inflight::CommandOutcome},
    models::logout::common::LogoutReason,
    transport::Events,
};
use tracing::{error, info, warn};

/// How many NOP-Out keepalive pings the demo CLI sends before logging out.
const NOP_COUNT: u32 = 3;

#[derive(Clone, Copy)]
enum Stage {
    LoggingIn,
    Pinging { sent: u32, acked: u32 },
    LoggingOut,
    Done,
}

fn main() -> Result<()> {
    let _init_logger = init_logger("config/logger.yaml")?;

    let config_path =
        std::env::args().nth(1).unwrap_or_else(|| "config/iscsi.yaml".to_string());

    let cfg = resolve_config_path(&config_path)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let addr = resolve_target_addr(&cfg.login.transport.target_address)?;

    let mut ctx = create_context(cfg);
    let stage = Rc::new(RefCell::new(Stage::LoggingIn));

    {
        let stage = Rc::clone(&stage);
        ctx.full_connect(
            addr,
            Box::new(move |res| match res {
                Ok(()) => info!("login succeeded, session is full-feature"),
                Err(e) => {
                    error!("login failed: {e}");
                    *stage.borrow_mut() = Stage::Done;
                },
            }),
        )?;
    }

    loop {
        let Some(fd) = ctx.get_fd() else { break };
        let Some(events) = ctx.which_events() else { break };

        let mut pfd = libc::pollfd { fd, events: poll_events(events), revents: 0 };

        // SAFETY: `pfd` is a single valid pollfd on the stack, alive for the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, 1_000) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }
        if ready == 0 {
            continue;
        }

        let revents = Events {
            readable: pfd.revents & libc::POLLIN != 0,
            writable: pfd.revents & libc::POLLOUT != 0,
        };

        if let Err(e) = ctx.service(revents) {
            warn!("session tore down: {e}");
            break;
        }

        advance(&mut ctx, &stage)?;

        if matches!(*stage.borrow(), Stage::Done) {
            break;
        }
    }

    if let Some(err) = ctx.get_error() {
        warn!("last session error: {err}");
    }
    ctx.destroy_context();
    Ok(())
}

/// Drives the connect -> ping -> logout script forward whenever the session
/// reaches the stage that unblocks the next step.
fn advance(ctx: &mut Context, stage: &Rc<RefCell<Stage>>) -> Result<()> {
    let snapshot = *stage.borrow();
    match snapshot {
        Stage::LoggingIn => {
            if ctx.is_logged_in() {
                *stage.borrow_mut() = Stage::Pinging { sent: 0, acked: 0 };
                advance(ctx, stage)?;
            }
        },
        Stage::Pinging { sent, acked } => {
            if sent < NOP_COUNT {
                *stage.borrow_mut() = Stage::Pinging { sent: sent + 1, acked };
                let stage = Rc::clone(stage);
                ctx.nop_out(
                    0,
                    Box::new(move |outcome: CommandOutcome| {
                        info!(status = outcome.status, "nop-out acknowledged");
                        if let Stage::Pinging { acked, .. } = &mut *stage.borrow_mut() {
                            *acked += 1;
                        }
                    }),
                )?;
            } else if acked == NOP_COUNT {
                *stage.borrow_mut() = Stage::LoggingOut;
                let stage = Rc::clone(stage);
                ctx.logout(
                    LogoutReason::CloseSession,
                    Box::new(move |_outcome| {
                        info!("logout acknowledged");
                        *stage.borrow_mut() = Stage::Done;
                    }),
                )?;
            }
        },
        Stage::LoggingOut | Stage::Done => {},
    }
    Ok(())
}

fn poll_events(events: Events) -> libc::c_short {
    let mut mask = 0;
    if events.readable {
        mask |= libc::POLLIN;
    }
    if events.writable {
        mask |= libc::POLLOUT;
    }
    mask
}

fn resolve_target_addr(target_address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = target_address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    target_address
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve target address {target_address:?}"))?
        .next()
        .context("target address resolved to no socket addresses")
}
