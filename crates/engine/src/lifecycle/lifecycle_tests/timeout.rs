// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{CommandStatus, ErrorCode};
use std::time::Duration;

async fn dispatch_test_op(h: &crate::test_support::Harness) {
    h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
}

#[tokio::test]
async fn warning_then_hard_timeout() {
    let h = ready();
    dispatch_test_op(&h).await;

    // test op: warn at 10m, hard at 30m
    h.clock.advance(Duration::from_secs(10 * 60));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::RunningWarning));
    assert!(h.lifecycle.has_active(&hid("h-1")));

    h.clock.advance(Duration::from_secs(20 * 60));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::TimeoutPending));
    // Still active: the user decides what happens next
    assert!(h.lifecycle.has_active(&hid("h-1")));
    assert_eq!(pending(&h, "h-1").as_deref(), Some("test"));
}

#[tokio::test]
async fn extend_restarts_the_watcher() {
    let h = ready();
    dispatch_test_op(&h).await;

    h.clock.advance(Duration::from_secs(30 * 60));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::TimeoutPending));

    h.lifecycle.extend_timeout(&hid("h-1"), 10).unwrap();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Executing));

    // 9 minutes: not yet
    h.clock.advance(Duration::from_secs(9 * 60));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Executing));

    // Past the extension: timeout pending again
    h.clock.advance(Duration::from_secs(2 * 60));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::TimeoutPending));
}

#[tokio::test]
async fn cancel_resolves_as_skipped() {
    let h = ready();
    dispatch_test_op(&h).await;

    h.clock.advance(Duration::from_secs(30 * 60));
    h.tick();
    h.lifecycle.cancel_command(&hid("h-1")).unwrap();

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Skipped));
    assert!(pending(&h, "h-1").is_none());
    assert!(!h.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn extend_without_active_command_is_no_pending() {
    let h = ready();
    let err = h.lifecycle.extend_timeout(&hid("h-1"), 5).unwrap_err();
    assert_eq!(err.code, ErrorCode::NoPending);

    let err = h.lifecycle.cancel_command(&hid("h-1")).unwrap_err();
    assert_eq!(err.code, ErrorCode::NoPending);
}

#[tokio::test]
async fn kill_marks_killing_then_killed_on_confirmation() {
    let h = ready();
    dispatch_test_op(&h).await;

    h.lifecycle.kill_command(&hid("h-1"), "SIGTERM", Some(4242)).await.unwrap();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Killing));
    assert!(h.lifecycle.has_active(&hid("h-1")));

    // Agent confirms via command_complete
    h.lifecycle.handle_command_complete(&hid("h-1"), "test", 137, None);
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Killed));
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn late_timers_for_finished_commands_are_ignored() {
    let h = ready();
    dispatch_test_op(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "test", 1, None);
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));

    // Whatever is left in the scheduler must not resurrect the command
    h.clock.advance(Duration::from_secs(3600));
    h.tick();
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));
}

#[tokio::test]
async fn recovery_rearms_or_resurfaces() {
    let h = ready();
    dispatch_test_op(&h).await;
    let before: Vec<_> = h.state.lock().active_commands().into_iter().cloned().collect();
    assert_eq!(before.len(), 1);

    // Simulate a restart: fresh lifecycle over the same store
    let h2 = crate::test_support::harness();
    {
        // Copy the durable state across
        let snapshot = h.state.lock().clone();
        *h2.state.lock() = snapshot;
    }

    // Not yet past the bound: watchers re-arm
    h2.lifecycle.recover();
    assert!(h2.lifecycle.has_active(&hid("h-1")));
    assert_eq!(command_status(&h2, "h-1"), Some(CommandStatus::Executing));

    // A third instance recovered after the hard bound resurfaces the decision
    let h3 = crate::test_support::harness();
    {
        let snapshot = h.state.lock().clone();
        *h3.state.lock() = snapshot;
    }
    h3.clock.set_epoch_ms(h.clock.epoch_ms() + 31 * 60 * 1000);
    h3.lifecycle.recover();
    assert_eq!(command_status(&h3, "h-1"), Some(CommandStatus::TimeoutPending));
}
