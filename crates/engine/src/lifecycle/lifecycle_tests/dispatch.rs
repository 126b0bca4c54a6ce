// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::Sent;
use fleet_core::{AgentReported, CommandStatus, ErrorCode, Event, HostStatus};

#[tokio::test]
async fn dispatch_sends_and_sets_pending() {
    let h = ready();
    // Make pull valid: host behind remote
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-old".into()),
        metrics: None,
        lock_status: Some(AgentReported::Outdated),
        system_status: None,
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });

    let cmd = h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    assert_eq!(cmd.status, CommandStatus::Executing);
    assert_eq!(pending(&h, "h-1").as_deref(), Some("pull"));
    assert_eq!(
        h.transport.sent(),
        vec![Sent::Command { host: hid("h-1"), op: "pull".into() }]
    );
    assert!(h.lifecycle.has_active(&hid("h-1")));
    // Watchers armed
    assert!(h.scheduler.lock().is_set(&format!("warn:{}", cmd.id)));
    assert!(h.scheduler.lock().is_set(&format!("hard:{}", cmd.id)));
}

#[tokio::test]
async fn unknown_op_and_host_are_structured_errors() {
    let h = ready();

    let err =
        h.lifecycle.execute_op("frobnicate", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownOp);

    let err =
        h.lifecycle.execute_op("pull", &hid("ghost"), false, None, "admin", &no_args()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownHost);
}

#[tokio::test]
async fn busy_host_rejects_second_dispatch_without_mutation() {
    let h = ready();
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-old".into()),
        metrics: None,
        lock_status: Some(AgentReported::Outdated),
        system_status: None,
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    let rows_before = h.state.lock().commands.len();

    let err =
        h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Busy);
    assert_eq!(h.state.lock().commands.len(), rows_before, "busy dispatch must not add rows");
    assert_eq!(pending(&h, "h-1").as_deref(), Some("pull"));
}

#[tokio::test]
async fn validation_failure_blocks_and_clears() {
    let h = ready();
    // Fixture host is already current: pull blocks with already_current
    let err =
        h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::AlreadyCurrent);
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Blocked));
    assert!(pending(&h, "h-1").is_none());
    assert!(!h.lifecycle.has_active(&hid("h-1")));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn force_bypasses_validation_but_not_single_flight() {
    let h = ready();

    let cmd =
        h.lifecycle.execute_op("pull", &hid("h-1"), true, None, "admin", &no_args()).await.unwrap();
    assert_eq!(cmd.status, CommandStatus::Executing);

    // Even forced, a second dispatch is busy
    let err =
        h.lifecycle.execute_op("pull", &hid("h-1"), true, None, "admin", &no_args()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Busy);
}

#[tokio::test]
async fn offline_host_blocks_agent_ops() {
    let h = ready();
    h.apply(Event::HostOffline { id: hid("h-1"), at_ms: h.clock.epoch_ms() });

    let err =
        h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Offline);
}

#[tokio::test]
async fn send_failure_is_terminal_send_failed() {
    let h = ready();
    h.transport.fail_next_sends(true);

    let cmd =
        h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    assert_eq!(cmd.status, CommandStatus::Error);
    assert_eq!(cmd.error.unwrap().code, ErrorCode::SendFailed);
    assert!(pending(&h, "h-1").is_none());
    assert!(!h.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn control_op_is_delivered_while_busy() {
    let h = ready();
    h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    let cmd =
        h.lifecycle.execute_op("restart", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    // Control send is audited as an immediately-terminal row
    assert_eq!(cmd.status, CommandStatus::Success);
    // The running command keeps its pending marker
    assert_eq!(pending(&h, "h-1").as_deref(), Some("test"));
    assert!(h.lifecycle.has_active(&hid("h-1")));
    assert_eq!(
        h.transport.sent(),
        vec![
            Sent::Command { host: hid("h-1"), op: "test".into() },
            Sent::Command { host: hid("h-1"), op: "restart".into() },
        ]
    );
}

#[tokio::test]
async fn set_color_executes_on_dashboard() {
    let h = ready();
    let mut args = serde_json::Map::new();
    args.insert("color".into(), serde_json::json!("#ff8800"));

    let cmd =
        h.lifecycle.execute_op("set-color", &hid("h-1"), false, None, "admin", &args).await.unwrap();

    assert_eq!(cmd.status, CommandStatus::Success);
    assert_eq!(
        h.state.lock().host(&hid("h-1")).unwrap().theme_color.as_deref(),
        Some("#ff8800")
    );
    assert!(h.transport.sent().is_empty());
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn remove_requires_offline_and_deletes_row() {
    let h = ready();

    let err =
        h.lifecycle.execute_op("remove", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Busy);

    h.apply(Event::HostOffline { id: hid("h-1"), at_ms: h.clock.epoch_ms() });
    let cmd =
        h.lifecycle.execute_op("remove", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    assert_eq!(cmd.status, CommandStatus::Success);
    assert!(h.state.lock().host(&hid("h-1")).is_none());
}

#[tokio::test]
async fn merge_pr_without_backend_errors() {
    let h = ready();
    let cmd =
        h.lifecycle.execute_op("merge-pr", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    assert_eq!(cmd.status, CommandStatus::Error);
    assert_eq!(cmd.error.unwrap().code, ErrorCode::RemoteUnavailable);
}

#[tokio::test]
async fn offline_host_status_matters_not_row_presence() {
    let h = ready();
    h.apply(Event::HostOffline { id: hid("h-1"), at_ms: h.clock.epoch_ms() });
    assert_eq!(
        h.state.lock().host(&hid("h-1")).unwrap().status,
        HostStatus::Offline
    );
}
