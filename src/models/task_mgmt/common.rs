// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::{Result, bail};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// iSCSI Task Management Function code (byte 1, low 7 bits of the request
/// BHS flags byte; bit 7 is always set on the wire).
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum TaskMgmtFunction {
    #[default]
    AbortTask = 1,
    AbortTaskSet = 2,
    ClearAca = 3,
    ClearTaskSet = 4,
    LogicalUnitReset = 5,
    TargetWarmReset = 6,
    TargetColdReset = 7,
}

impl TaskMgmtFunction {
    #[inline]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for TaskMgmtFunction {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        use TaskMgmtFunction::*;
        Ok(match value {
            1 => AbortTask,
            2 => AbortTaskSet,
            3 => ClearAca,
            4 => ClearTaskSet,
            5 => LogicalUnitReset,
            6 => TargetWarmReset,
            7 => TargetColdReset,
            other => bail!("unexpected task management function code {other}"),
        })
    }
}

impl fmt::Display for TaskMgmtFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TaskMgmtFunction::*;
        let s = match self {
            AbortTask => "AbortTask",
            AbortTaskSet => "AbortTaskSet",
            ClearAca => "ClearAca",
            ClearTaskSet => "ClearTaskSet",
            LogicalUnitReset => "LogicalUnitReset",
            TargetWarmReset => "TargetWarmReset",
            TargetColdReset => "TargetColdReset",
        };
        f.write_str(s)
    }
}

/// Wire-safe wrapper for the request flags byte: bit7 fixed at 1 (per the
/// wire convention used by reference initiators), low 7 bits the function
/// code.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawTaskMgmtFlags(u8);

impl Default for RawTaskMgmtFlags {
    #[inline]
    fn default() -> Self {
        Self(0x80)
    }
}

impl RawTaskMgmtFlags {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn function(self) -> Result<TaskMgmtFunction> {
        TaskMgmtFunction::try_from(self.0 & 0x7F)
    }

    #[inline]
    pub fn set_function(&mut self, f: TaskMgmtFunction) {
        self.0 = 0x80 | (f.as_u8() & 0x7F);
    }
}

impl fmt::Debug for RawTaskMgmtFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function() {
            Ok(func) => write!(f, "RawTaskMgmtFlags({func})"),
            Err(_) => write!(f, "RawTaskMgmtFlags(raw=0x{:02x})", self.0),
        }
    }
}

/// iSCSI Task Management Response code (byte 2 of the response BHS).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum TaskMgmtResponseCode {
    FunctionComplete = 0,
    TaskDoesNotExist = 1,
    LunDoesNotExist = 2,
    TaskStillAllocated = 3,
    FunctionNotSupported = 5,
    FunctionAuthorizationFailed = 6,
    FunctionRejected = 255,
}

impl TryFrom<u8> for TaskMgmtResponseCode {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> Result<Self> {
        use TaskMgmtResponseCode::*;
        Ok(match v {
            0 => FunctionComplete,
            1 => TaskDoesNotExist,
            2 => LunDoesNotExist,
            3 => TaskStillAllocated,
            5 => FunctionNotSupported,
            6 => FunctionAuthorizationFailed,
            255 => FunctionRejected,
            other => bail!("invalid task management response code {other}"),
        })
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawTaskMgmtResponseCode(u8);

impl Default for RawTaskMgmtResponseCode {
    #[inline]
    fn default() -> Self {
        Self(TaskMgmtResponseCode::FunctionComplete as u8)
    }
}

impl RawTaskMgmtResponseCode {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn decode(self) -> Result<TaskMgmtResponseCode> {
        TaskMgmtResponseCode::try_from(self.0)
    }

    #[inline]
    pub fn encode(&mut self, code: TaskMgmtResponseCode) {
        self.0 = code as u8;
    }
}

impl fmt::Debug for RawTaskMgmtResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Ok(code) => write!(f, "RawTaskMgmtResponseCode({code:?})"),
            Err(_) => write!(f, "RawTaskMgmtResponseCode(invalid=0x{:02x})", self.0),
        }
    }
}
