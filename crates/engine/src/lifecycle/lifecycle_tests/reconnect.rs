// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{test_support, AgentReported, CommandStatus, ErrorCode, Event, Freshness};
use std::time::Duration;

fn fresh(commit: &str, store: &str, hash: &str) -> Freshness {
    Freshness {
        source_commit: Some(commit.to_string()),
        store_path: Some(store.to_string()),
        binary_hash: Some(hash.to_string()),
    }
}

/// Host with an outdated system and known binary identity, switch dispatched
/// and completed with exit 0: parked in AWAITING_RECONNECT.
async fn switch_awaiting(h: &crate::test_support::Harness) {
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-a".into()),
        metrics: None,
        lock_status: Some(AgentReported::Ok),
        system_status: Some(AgentReported::Outdated),
        tests_status: None,
        tests_generation: None,
        freshness: Some(fresh("commit-a", "/nix/store/s1", "hash-x")),
    });
    h.lifecycle.execute_op("switch", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    h.lifecycle.handle_command_complete(&hid("h-1"), "switch", 0, None);
    assert_eq!(command_status(h, "h-1"), Some(CommandStatus::AwaitingReconnect));
}

/// The agent process comes back and registers with the given freshness.
fn reconnect_with(h: &crate::test_support::Harness, freshness: Freshness) {
    let mut row = test_support::host("h-1");
    row.freshness = Some(freshness);
    h.apply(Event::HostRegistered { host: row });
    h.lifecycle.handle_agent_reconnect(&hid("h-1"));
}

#[tokio::test]
async fn fresh_binary_reconnect_succeeds() {
    let h = ready();
    switch_awaiting(&h).await;

    reconnect_with(&h, fresh("commit-b", "/nix/store/s2", "hash-y"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Success));
    assert!(pending(&h, "h-1").is_none());
    assert!(!h.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn stale_binary_reconnect_fails() {
    let h = ready();
    switch_awaiting(&h).await;

    // Same commit, same store path, same hash: nothing was replaced
    reconnect_with(&h, fresh("commit-a", "/nix/store/s1", "hash-x"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::StaleBinary));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    let err = row.error.unwrap();
    assert_eq!(err.code, ErrorCode::StaleBinary);
    assert!(err.message.contains("old binary"));
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn cache_built_binary_is_suspicious() {
    let h = ready();
    switch_awaiting(&h).await;

    // Source moved but the artifact did not
    reconnect_with(&h, fresh("commit-b", "/nix/store/s1", "hash-x"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Suspicious));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    assert_eq!(row.error.unwrap().code, ErrorCode::Suspicious);
}

#[tokio::test]
async fn missing_freshness_assumes_success() {
    let h = ready();
    switch_awaiting(&h).await;

    reconnect_with(&h, Freshness::default());

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Success));
}

#[tokio::test]
async fn reconnect_deadline_expiry_is_timeout() {
    let h = ready();
    switch_awaiting(&h).await;

    h.clock.advance(Duration::from_secs(121));
    h.tick();

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Timeout));
    let row = h.state.lock().commands.values().next().cloned().unwrap();
    let err = row.error.unwrap();
    assert_eq!(err.code, ErrorCode::ReconnectTimeout);
    assert!(err.message.contains("did not reconnect"));
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn fresh_reconnect_with_outdated_system_is_goal_not_achieved() {
    let h = ready();
    switch_awaiting(&h).await;

    // New binary, but the register still reports system=outdated: the
    // switch demonstrably did not land.
    let mut row = test_support::host("h-1");
    row.system_status = AgentReported::Outdated;
    row.freshness = Some(fresh("commit-b", "/nix/store/s2", "hash-y"));
    h.apply(Event::HostRegistered { host: row });
    h.lifecycle.handle_agent_reconnect(&hid("h-1"));

    assert_eq!(command_status(&h, "h-1"), Some(CommandStatus::Error));
    let err = h.state.lock().commands.values().next().cloned().unwrap().error.unwrap();
    assert_eq!(err.code, ErrorCode::GoalNotAchieved);
}
