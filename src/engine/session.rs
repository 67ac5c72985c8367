// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CmdSN/ExpStatSN bookkeeping and Initiator Task Tag allocation.
//!
//! Both live on the session context, not on any single PDU: CmdSN only
//! advances for non-immediate requests, ExpStatSN tracks the highest
//! StatSN seen so far, and ITTs are handed out from a rolling counter
//! that skips the reserved "no tag" sentinel.

use anyhow::Result;

use crate::{engine::inflight::InFlightTable, error::IscsiError};

/// Reserved value meaning "no task tag" (e.g. unsolicited NOP-In).
pub const UNTAGGED: u32 = 0xffff_ffff;

#[derive(Debug, Default)]
pub struct CommandSequence {
    cmd_sn: u32,
    exp_stat_sn: u32,
}

impl CommandSequence {
    /// Adopt the floor values a target hands back in the final Login
    /// Response: CmdSN becomes the target's ExpCmdSN, ExpStatSN becomes
    /// StatSN+1.
    pub fn sync_from_login(&mut self, exp_cmd_sn: u32, stat_sn: u32) {
        self.cmd_sn = exp_cmd_sn;
        self.exp_stat_sn = stat_sn.wrapping_add(1);
    }

    /// CmdSN to stamp on the next outgoing request. Non-immediate
    /// requests consume the slot (advance by one); immediate requests
    /// reuse the current value.
    pub fn next_cmd_sn(&mut self, immediate: bool) -> u32 {
        let sn = self.cmd_sn;
        if !immediate {
            self.cmd_sn = self.cmd_sn.wrapping_add(1);
        }
        sn
    }

    pub fn exp_stat_sn(&self) -> u32 {
        self.exp_stat_sn
    }

    /// Folds in a StatSN observed on an inbound PDU. Silent resync: the
    /// target may jump ExpStatSN forward, we just track the max seen.
    pub fn observe_stat_sn(&mut self, stat_sn: u32) {
        let delta = stat_sn.wrapping_sub(self.exp_stat_sn.wrapping_sub(1));
        if (delta as i32) >= 0 {
            self.exp_stat_sn = stat_sn.wrapping_add(1);
        }
    }
}

/// Hands out Initiator Task Tags, skipping the ones already in flight and
/// the reserved [`UNTAGGED`] sentinel.
#[derive(Debug)]
pub struct IttAllocator {
    next: u32,
}

impl Default for IttAllocator {
    fn default() -> Self {
        Self { next: 0 }
    }
}

impl IttAllocator {
    pub fn alloc(&mut self, in_flight: &InFlightTable) -> Result<u32> {
        let start = self.next;
        loop {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1);
            if self.next == UNTAGGED {
                self.next = 0;
            }
            if candidate != UNTAGGED && !in_flight.contains(candidate) {
                return Ok(candidate);
            }
            if self.next == start {
                return Err(IscsiError::TagSpaceExhausted.into());
            }
        }
    }
}
