// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn available(fetched_at_ms: u64) -> RemoteState {
    RemoteState::Available {
        version: RemoteVersion {
            git_commit: "abc".into(),
            lock_hash: "def".into(),
            fetched_at_ms,
        },
    }
}

#[test]
fn fresh_fetch_is_ok() {
    let state = available(1_000);
    match state.view(2_000, 60_000) {
        RemoteView::Ok(v) => assert_eq!(v.git_commit, "abc"),
        other => panic!("expected Ok, got {other:?}"),
    }
}

#[test]
fn ttl_expiry_degrades_to_error_not_unknown() {
    let state = available(1_000);
    assert!(matches!(state.view(100_000, 60_000), RemoteView::Error(_)));
}

#[test]
fn fetch_failure_is_error() {
    let state = RemoteState::Error { message: "503".into(), at_ms: 1 };
    assert!(matches!(state.view(2, 60_000), RemoteView::Error(_)));
}

#[test]
fn before_first_fetch_is_unknown() {
    assert!(matches!(RemoteState::default().view(1, 60_000), RemoteView::Unknown));
}
