// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn codes_serialize_to_snake_case() {
    assert_eq!(serde_json::to_string(&ErrorCode::RemoteUnavailable).unwrap(), "\"remote_unavailable\"");
    assert_eq!(serde_json::to_string(&ErrorCode::TotpRequired).unwrap(), "\"totp_required\"");
    assert_eq!(serde_json::to_string(&ErrorCode::StaleBinary).unwrap(), "\"stale_binary\"");
}

#[test]
fn display_matches_serde() {
    for code in [
        ErrorCode::Offline,
        ErrorCode::Busy,
        ErrorCode::AlreadyCurrent,
        ErrorCode::GitOutdated,
        ErrorCode::LockOutdated,
        ErrorCode::RemoteUnavailable,
        ErrorCode::NoPending,
        ErrorCode::UnknownOp,
        ErrorCode::UnknownHost,
        ErrorCode::TotpRequired,
        ErrorCode::SendFailed,
        ErrorCode::Rejected,
        ErrorCode::Timeout,
        ErrorCode::ReconnectTimeout,
        ErrorCode::GoalNotAchieved,
        ErrorCode::PartialGitOnly,
        ErrorCode::ExitNonzero,
        ErrorCode::StaleBinary,
        ErrorCode::Suspicious,
        ErrorCode::AuthFailed,
        ErrorCode::QueueOverflow,
        ErrorCode::PeerGone,
        ErrorCode::PersistFailed,
    ] {
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, format!("\"{code}\""));
    }
}

#[test]
fn validation_error_display() {
    let err = ValidationError::new(ErrorCode::Busy, "command already running");
    assert_eq!(err.to_string(), "busy: command already running");
}

#[test]
fn validation_error_round_trips() {
    let err = ValidationError::new(ErrorCode::Offline, "host is offline");
    let json = serde_json::to_string(&err).unwrap();
    let parsed: ValidationError = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, err);
}
