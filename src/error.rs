// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Leaf error type for the engine/transport layers. Call sites that only
//! need to propagate a failure keep using `anyhow::Result`; this type exists
//! for callers that want to match on *why* something failed (e.g. to decide
//! whether a CHECK CONDITION is retryable).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IscsiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed pdu: {0}")]
    Framing(String),

    #[error("login failed at stage {stage}: {reason}")]
    LoginRejected { stage: &'static str, reason: String },

    #[error("target returned CHECK CONDITION: {0}")]
    CheckCondition(String),

    #[error("session is not in full-feature phase")]
    NotLoggedIn,

    #[error("initiator task tag space exhausted")]
    TagSpaceExhausted,

    #[error("no in-flight command for itt={0}")]
    UnknownTag(u32),

    #[error("expected data transfer length does not match buffer length")]
    LengthMismatch,

    #[error("unexpected pdu: {0}")]
    UnexpectedPdu(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("logout requested with {0} command(s) still in flight")]
    BusyCommandsInFlight(usize),

    #[error(transparent)]
    Protocol(#[from] anyhow::Error),
}
