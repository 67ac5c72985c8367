// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! ITT-keyed table of commands the dispatcher is waiting on.
//!
//! One entry is created per outgoing request that expects a matching
//! response (SCSI Command, Task Management, Logout, Text, caller-issued
//! NOP-Out). The table owns no locks: the whole engine is single-threaded,
//! callbacks run synchronously out of [`InFlightTable::complete`]/
//! [`InFlightTable::cancel_all`].

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::models::data::sense_data::SenseData;

/// Wire status values used in [`CommandOutcome::status`], matching the
/// reference initiator's public constants.
pub const STATUS_GOOD: u32 = 0x0000_0000;
pub const STATUS_CHECK_CONDITION: u32 = 0x0000_0002;
pub const STATUS_CANCELLED: u32 = 0x0f00_0000;
pub const STATUS_ERROR: u32 = 0x0f00_0001;

/// What a pending command is waiting for.
pub enum CommandKind {
    ScsiCommand {
        datain: BytesMut,
        final_status: Option<u8>,
        /// WRITE payload not yet sent; drained into a Data-Out PDU the
        /// first time a matching R2T arrives.
        write_data: Option<Bytes>,
    },
    TaskMgmt,
    Logout,
    /// Text negotiation response, possibly split across several
    /// Continue-flagged PDUs.
    Text { buffer: BytesMut },
    NopOut,
}

/// Delivered to a command's callback exactly once.
pub struct CommandOutcome {
    pub status: u32,
    pub data: Bytes,
    pub sense: Option<SenseData>,
}

impl CommandOutcome {
    pub fn good(data: Bytes) -> Self {
        Self { status: STATUS_GOOD, data, sense: None }
    }

    pub fn check_condition(sense: SenseData) -> Self {
        Self { status: STATUS_CHECK_CONDITION, data: Bytes::new(), sense: Some(sense) }
    }

    pub fn cancelled() -> Self {
        Self { status: STATUS_CANCELLED, data: Bytes::new(), sense: None }
    }

    pub fn error() -> Self {
        Self { status: STATUS_ERROR, data: Bytes::new(), sense: None }
    }
}

pub type Callback = Box<dyn FnOnce(CommandOutcome)>;

pub struct PendingCommand {
    pub kind: CommandKind,
    callback: Callback,
    /// The exact bytes last sent for this ITT (header + body), kept so a
    /// Reject naming a resendable reason can be answered by retransmitting
    /// rather than rebuilding the request.
    pub resend: Option<([u8; crate::models::common::HEADER_LEN], Bytes)>,
}

/// ITT-keyed table of commands awaiting a terminal PDU. Plain `HashMap`:
/// the engine that owns this table is never shared across threads.
#[derive(Default)]
pub struct InFlightTable {
    entries: HashMap<u32, PendingCommand>,
}

impl InFlightTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, itt: u32) -> bool {
        self.entries.contains_key(&itt)
    }

    pub fn insert(&mut self, itt: u32, kind: CommandKind, callback: Callback) {
        self.entries
            .insert(itt, PendingCommand { kind, callback, resend: None });
    }

    /// Like [`InFlightTable::insert`], but also remembers the exact frame
    /// sent so a resendable Reject can be answered without rebuilding the
    /// request.
    pub fn insert_resendable(
        &mut self,
        itt: u32,
        kind: CommandKind,
        callback: Callback,
        header: [u8; crate::models::common::HEADER_LEN],
        body: Bytes,
    ) {
        self.entries.insert(itt, PendingCommand {
            kind,
            callback,
            resend: Some((header, body)),
        });
    }

    pub fn get_mut(&mut self, itt: u32) -> Option<&mut PendingCommand> {
        self.entries.get_mut(&itt)
    }

    /// The frame last sent for `itt`, if it was inserted with
    /// [`InFlightTable::insert_resendable`]. Cheap: `Bytes` is refcounted.
    pub fn resend_bytes(&self, itt: u32) -> Option<([u8; crate::models::common::HEADER_LEN], Bytes)> {
        self.entries.get(&itt).and_then(|p| p.resend.clone())
    }

    /// Removes the entry and fires its callback. Delivery removes the
    /// entry *before* invoking the callback so a re-entrant enqueue from
    /// within the callback can reuse the same ITT.
    pub fn complete(&mut self, itt: u32, outcome: CommandOutcome) -> bool {
        match self.entries.remove(&itt) {
            Some(pending) => {
                (pending.callback)(outcome);
                true
            },
            None => false,
        }
    }

    /// Walks every pending command and fires `Cancelled` on each, in
    /// arbitrary order, then drops the table's contents.
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.entries.drain() {
            (pending.callback)(CommandOutcome::cancelled());
        }
    }
}
