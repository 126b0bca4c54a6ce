// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{AgentReported, CommandStatus, ErrorCode, Event};

/// Put h-1 behind the remote and dispatch a pull.
async fn dispatch_pull(h: &crate::test_support::Harness) -> fleet_core::Command {
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
    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap()
}

fn heartbeat_current(h: &crate::test_support::Harness) {
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-a".into()),
        metrics: None,
        lock_status: Some(AgentReported::Ok),
        system_status: Some(AgentReported::Ok),
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
    h.lifecycle.handle_heartbeat(&hid("h-1"));
}

#[tokio::test]
async fn exit_zero_defers_post_check_to_heartbeat() {
    let h = ready();
    dispatch_pull(&h).await;

    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);

    // Still active: exit 0 alone does not decide
    assert!(h.lifecycle.has_active(&hid("h-1")));
    assert_eq!(pending(&h, "h-1").as_deref(), Some("pull"));

    heartbeat_current(&h);

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Success));
    assert!(pending(&h, "h-1").is_none());
    assert!(!h.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn pull_post_check_partial_when_lock_stays_dirty() {
    let h = ready();
    dispatch_pull(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);

    // Generation advanced but lock still outdated
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-a".into()),
        metrics: None,
        lock_status: Some(AgentReported::Outdated),
        system_status: None,
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
    h.lifecycle.handle_heartbeat(&hid("h-1"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Partial));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    assert_eq!(row.error.unwrap().code, ErrorCode::PartialGitOnly);
}

#[tokio::test]
async fn pull_post_check_fails_without_progress() {
    let h = ready();
    dispatch_pull(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);

    // Nothing moved
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
    h.lifecycle.handle_heartbeat(&hid("h-1"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    assert_eq!(row.error.unwrap().code, ErrorCode::GoalNotAchieved);
}

#[tokio::test]
async fn nonzero_exit_is_error_regardless_of_compartments() {
    let h = ready();
    dispatch_pull(&h).await;

    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 2, None);

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    assert_eq!(row.exit_code, Some(2));
    assert_eq!(row.error.unwrap().code, ErrorCode::ExitNonzero);
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn duplicate_completion_is_a_no_op() {
    let h = ready();
    dispatch_pull(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 2, None);
    let after_first: Vec<_> =
        h.state.lock().commands.values().cloned().collect();

    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);

    let after_second: Vec<_> =
        h.state.lock().commands.values().cloned().collect();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn completion_for_mismatched_op_is_ignored() {
    let h = ready();
    dispatch_pull(&h).await;

    h.lifecycle.handle_command_complete(&hid("h-1"), "test", 0, None);

    assert!(h.lifecycle.has_active(&hid("h-1")));
    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Executing));
}

#[tokio::test]
async fn rejected_command_fails_with_rejected_code() {
    let h = ready();
    dispatch_pull(&h).await;

    h.lifecycle.handle_command_rejected(&hid("h-1"), "already running pull");

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    assert_eq!(row.error.unwrap().code, ErrorCode::Rejected);
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn fresh_status_on_completion_decides_immediately() {
    let h = ready();
    dispatch_pull(&h).await;

    // Completion carries lock=ok: post-check can settle without heartbeat
    h.lifecycle.handle_command_complete(
        &hid("h-1"),
        "pull",
        0,
        Some((AgentReported::Ok, AgentReported::Ok)),
    );

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Success));
    assert!(!h.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn test_op_success_follows_tests_compartment() {
    let h = ready();
    h.lifecycle.execute_op("test", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    h.lifecycle.handle_command_complete(&hid("h-1"), "test", 0, None);

    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-a".into()),
        metrics: None,
        lock_status: Some(AgentReported::Ok),
        system_status: Some(AgentReported::Ok),
        tests_status: Some(AgentReported::Ok),
        tests_generation: Some("commit-a".into()),
        freshness: None,
    });
    h.lifecycle.handle_heartbeat(&hid("h-1"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Success));
}
