// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy pull: dispatch → execute → heartbeat → post-check → compartments.

use super::prelude::*;
use fleet_core::CompartmentStatus;

#[tokio::test]
async fn happy_pull_ends_green() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");

    // Dispatch: validation passes because Git is outdated
    let cmd = h
        .lifecycle
        .execute_op("pull", &hid("h-1"), false, None, "admin", &no_args())
        .await
        .unwrap();
    assert_eq!(cmd.status, CommandStatus::Executing);
    assert_eq!(h.transport.sent(), vec![Sent::Command { host: hid("h-1"), op: "pull".into() }]);
    assert_eq!(pending(&h, "h-1").as_deref(), Some("pull"));

    // Agent exits 0; success is not yet decided
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);
    assert!(h.lifecycle.has_active(&hid("h-1")));

    // Next heartbeat carries lock=ok and the remote generation
    heartbeat(&h, "h-1", "commit-a", AgentReported::Ok, AgentReported::Ok);

    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::Success);
    assert!(row.finished_at_ms.unwrap() >= row.started_at_ms.unwrap());
    assert!(row.started_at_ms.unwrap() >= row.created_at_ms);
    assert!(pending(&h, "h-1").is_none());

    // Git compartment is green again
    let state = h.state.lock();
    let host = state.host(&hid("h-1")).unwrap();
    let compartments =
        fleet_engine::Evaluator::new(
            std::sync::Arc::new(fleet_engine::OpRegistry::builtin()),
            "0.2.0",
            60_000,
        )
        .evaluate(host, &state.remote, h.clock.epoch_ms());
    assert_eq!(compartments.git.status, CompartmentStatus::Ok);
}

#[tokio::test]
async fn dispatching_busy_host_is_rejected_idempotently() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");

    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    let rows = h.state.lock().commands.len();

    let err = h
        .lifecycle
        .execute_op("pull", &hid("h-1"), false, None, "admin", &no_args())
        .await
        .unwrap_err();
    assert_eq!(err.code, fleet_core::ErrorCode::Busy);
    assert_eq!(h.state.lock().commands.len(), rows);
}

#[tokio::test]
async fn duplicate_command_complete_after_terminal_is_ignored() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");

    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 1, None);
    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::Error);

    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);
    assert_eq!(last_command(&h, "h-1"), row);
}
