// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine error codes and the structured validation error.
//!
//! Codes are stable wire-visible identifiers, not type names. Validation
//! errors surface synchronously to the dispatcher (HTTP 409); lifecycle
//! codes end up inside terminal command rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable machine code for every failure the control plane can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Validation
    Offline,
    Busy,
    AlreadyCurrent,
    GitOutdated,
    LockOutdated,
    RemoteUnavailable,
    NoPending,
    UnknownOp,
    UnknownHost,
    TotpRequired,
    // Lifecycle
    SendFailed,
    Rejected,
    Timeout,
    ReconnectTimeout,
    GoalNotAchieved,
    PartialGitOnly,
    ExitNonzero,
    // Freshness
    StaleBinary,
    Suspicious,
    // Transport
    AuthFailed,
    QueueOverflow,
    PeerGone,
    // Store
    PersistFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Busy => "busy",
            Self::AlreadyCurrent => "already_current",
            Self::GitOutdated => "git_outdated",
            Self::LockOutdated => "lock_outdated",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::NoPending => "no_pending",
            Self::UnknownOp => "unknown_op",
            Self::UnknownHost => "unknown_host",
            Self::TotpRequired => "totp_required",
            Self::SendFailed => "send_failed",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::ReconnectTimeout => "reconnect_timeout",
            Self::GoalNotAchieved => "goal_not_achieved",
            Self::PartialGitOnly => "partial_git_only",
            Self::ExitNonzero => "exit_nonzero",
            Self::StaleBinary => "stale_binary",
            Self::Suspicious => "suspicious",
            Self::AuthFailed => "auth_failed",
            Self::QueueOverflow => "queue_overflow",
            Self::PeerGone => "peer_gone",
            Self::PersistFailed => "persist_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validation decision with machine code plus human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
