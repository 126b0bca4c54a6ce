// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::state::EVENT_LOG_CAP;
use crate::MaterializedState;
use fleet_core::{Event, LogEntry, LogLevel, RemoteState};

fn entry(id: &str) -> LogEntry {
    LogEntry {
        id: id.to_string(),
        at_ms: 1,
        category: "command".into(),
        level: LogLevel::Info,
        actor: "system".into(),
        host_id: None,
        action: None,
        message: "msg".into(),
        details: None,
    }
}

#[test]
fn double_applied_entry_is_deduplicated() {
    let mut state = MaterializedState::default();
    let event = Event::Logged { entry: entry("e-1") };
    state.apply_event(&event);
    state.apply_event(&event);
    assert_eq!(state.events.len(), 1);
}

#[test]
fn log_is_fifo_bounded() {
    let mut state = MaterializedState::default();
    for n in 0..(EVENT_LOG_CAP + 10) {
        state.apply_event(&Event::Logged { entry: entry(&format!("e-{n}")) });
    }
    assert_eq!(state.events.len(), EVENT_LOG_CAP);
    // Oldest entries fell off the front
    assert_eq!(state.events.front().unwrap().id, "e-10");
}

#[test]
fn recent_events_returns_tail_in_order() {
    let mut state = MaterializedState::default();
    for n in 0..5 {
        state.apply_event(&Event::Logged { entry: entry(&format!("e-{n}")) });
    }
    let recent = state.recent_events(2);
    assert_eq!(recent.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["e-3", "e-4"]);
}

#[test]
fn remote_version_events_update_mirror() {
    let mut state = MaterializedState::default();
    assert_eq!(state.remote, RemoteState::Unknown);

    state.apply_event(&Event::RemoteVersionFetched {
        git_commit: "abc".into(),
        lock_hash: "def".into(),
        at_ms: 10,
    });
    assert!(matches!(state.remote, RemoteState::Available { .. }));

    state.apply_event(&Event::RemoteVersionFailed { error: "timeout".into(), at_ms: 11 });
    assert!(matches!(state.remote, RemoteState::Error { .. }));
}
