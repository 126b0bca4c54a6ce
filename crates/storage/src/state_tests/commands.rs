// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{hid, with_host};
use fleet_core::test_support;
use fleet_core::{CommandId, CommandStatus, ErrorCode, Event};

fn cid(id: &str) -> CommandId {
    CommandId::new(id)
}

fn created(state: &mut crate::MaterializedState, id: &str, op: &str) {
    state.apply_event(&Event::CommandCreated {
        command: test_support::command(id, "h-1", op, CommandStatus::Validating),
    });
}

#[test]
fn started_sets_pending_command() {
    let mut state = with_host("h-1");
    created(&mut state, "c-1", "pull");

    state.apply_event(&Event::CommandStarted {
        id: cid("c-1"),
        host_id: hid("h-1"),
        op_id: "pull".into(),
        at_ms: 10,
    });

    let cmd = state.command(&cid("c-1")).unwrap();
    assert_eq!(cmd.status, CommandStatus::Executing);
    assert_eq!(cmd.started_at_ms, Some(10));
    assert_eq!(state.host(&hid("h-1")).unwrap().pending_command.as_deref(), Some("pull"));
}

#[test]
fn finished_clears_pending_and_is_write_once() {
    let mut state = with_host("h-1");
    created(&mut state, "c-1", "pull");
    state.apply_event(&Event::CommandStarted {
        id: cid("c-1"),
        host_id: hid("h-1"),
        op_id: "pull".into(),
        at_ms: 10,
    });

    state.apply_event(&Event::CommandFinished {
        id: cid("c-1"),
        host_id: hid("h-1"),
        status: CommandStatus::Success,
        exit_code: Some(0),
        error: None,
        at_ms: 20,
    });
    assert!(state.host(&hid("h-1")).unwrap().pending_command.is_none());
    assert_eq!(state.command(&cid("c-1")).unwrap().status, CommandStatus::Success);

    // A late duplicate completion with a different status is a no-op.
    state.apply_event(&Event::CommandFinished {
        id: cid("c-1"),
        host_id: hid("h-1"),
        status: CommandStatus::Error,
        exit_code: Some(1),
        error: None,
        at_ms: 30,
    });
    let cmd = state.command(&cid("c-1")).unwrap();
    assert_eq!(cmd.status, CommandStatus::Success);
    assert_eq!(cmd.finished_at_ms, Some(20));
}

#[test]
fn blocked_records_code_and_message() {
    let mut state = with_host("h-1");
    created(&mut state, "c-1", "pull");

    state.apply_event(&Event::CommandBlocked {
        id: cid("c-1"),
        code: ErrorCode::Offline,
        message: "host is offline".into(),
        at_ms: 5,
    });

    let cmd = state.command(&cid("c-1")).unwrap();
    assert_eq!(cmd.status, CommandStatus::Blocked);
    let err = cmd.error.as_ref().unwrap();
    assert_eq!(err.code, ErrorCode::Offline);
}

#[test]
fn intermediate_statuses() {
    let mut state = with_host("h-1");
    created(&mut state, "c-1", "switch");
    state.apply_event(&Event::CommandStarted {
        id: cid("c-1"),
        host_id: hid("h-1"),
        op_id: "switch".into(),
        at_ms: 1,
    });

    state.apply_event(&Event::CommandWarning { id: cid("c-1"), at_ms: 2 });
    assert_eq!(state.command(&cid("c-1")).unwrap().status, CommandStatus::RunningWarning);

    state.apply_event(&Event::CommandTimeoutPending { id: cid("c-1"), at_ms: 3 });
    assert_eq!(state.command(&cid("c-1")).unwrap().status, CommandStatus::TimeoutPending);

    state.apply_event(&Event::CommandExtended { id: cid("c-1"), minutes: 10, at_ms: 4 });
    assert_eq!(state.command(&cid("c-1")).unwrap().status, CommandStatus::Executing);

    state.apply_event(&Event::CommandAwaitingReconnect { id: cid("c-1"), deadline_ms: 99 });
    assert_eq!(state.command(&cid("c-1")).unwrap().status, CommandStatus::AwaitingReconnect);
}

#[test]
fn active_command_queries() {
    let mut state = with_host("h-1");
    created(&mut state, "c-1", "pull");
    state.apply_event(&Event::CommandStarted {
        id: cid("c-1"),
        host_id: hid("h-1"),
        op_id: "pull".into(),
        at_ms: 1,
    });

    assert_eq!(state.active_commands().len(), 1);
    assert_eq!(state.active_command_for(&hid("h-1")).unwrap().id, cid("c-1"));
    assert!(state.active_command_for(&hid("ghost")).is_none());

    state.apply_event(&Event::CommandFinished {
        id: cid("c-1"),
        host_id: hid("h-1"),
        status: CommandStatus::Success,
        exit_code: Some(0),
        error: None,
        at_ms: 2,
    });
    assert!(state.active_commands().is_empty());
}

#[test]
fn recent_commands_newest_first() {
    let mut state = with_host("h-1");
    for (i, id) in ["c-1", "c-2", "c-3"].iter().enumerate() {
        let mut cmd = test_support::command(id, "h-1", "test", CommandStatus::Success);
        cmd.created_at_ms = i as u64;
        state.apply_event(&Event::CommandCreated { command: cmd });
    }
    let recent = state.recent_commands(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, cid("c-3"));
    assert_eq!(recent[1].id, cid("c-2"));
}
