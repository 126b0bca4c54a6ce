// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command rows and the command status vocabulary.

use crate::error::ErrorCode;
use crate::host::HostId;
use crate::pipeline::PipelineId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier for a single dispatched command (uuid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a command.
///
/// Terminal states are write-once: once a command reaches one, later
/// transitions are ignored (duplicate `command_complete` is a no-op).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Validating,
    Executing,
    RunningWarning,
    TimeoutPending,
    AwaitingReconnect,
    Killing,
    // Terminal
    Success,
    Error,
    Timeout,
    Killed,
    Partial,
    Skipped,
    Blocked,
    StaleBinary,
    Suspicious,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::Error
                | Self::Timeout
                | Self::Killed
                | Self::Partial
                | Self::Skipped
                | Self::Blocked
                | Self::StaleBinary
                | Self::Suspicious
        )
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::RunningWarning => "running_warning",
            Self::TimeoutPending => "timeout_pending",
            Self::AwaitingReconnect => "awaiting_reconnect",
            Self::Killing => "killing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Killed => "killed",
            Self::Partial => "partial",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
            Self::StaleBinary => "stale_binary",
            Self::Suspicious => "suspicious",
        };
        write!(f, "{s}")
    }
}

/// Machine-readable failure attached to a terminal command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A dispatched operation on a single host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub host_id: HostId,
    pub op_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<PipelineId>,
    pub status: CommandStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

impl Command {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
