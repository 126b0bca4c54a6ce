// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switch flows: reconnect verification of binary freshness.

use super::prelude::*;
use std::time::Duration;

fn fresh(commit: &str, hash: &str) -> Freshness {
    Freshness {
        source_commit: Some(commit.to_string()),
        store_path: Some(format!("/nix/store/{hash}")),
        binary_hash: Some(hash.to_string()),
    }
}

/// Host with system outdated and a known binary identity, mid-switch.
async fn dispatch_switch(h: &Harness) {
    h.apply(Event::HostSeen {
        id: hid("h-1"),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-a".to_string()),
        metrics: None,
        lock_status: Some(AgentReported::Ok),
        system_status: Some(AgentReported::Outdated),
        tests_status: None,
        tests_generation: None,
        freshness: Some(fresh("commit-a", "hash-x")),
    });
    h.lifecycle.execute_op("switch", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
}

fn reconnect(h: &Harness, freshness: Freshness, system: AgentReported) {
    let mut row = fleet_core::test_support::host("h-1");
    row.system_status = system;
    row.freshness = Some(freshness);
    h.apply(Event::HostRegistered { host: row });
    h.lifecycle.handle_agent_reconnect(&hid("h-1"));
}

#[tokio::test]
async fn switch_with_agent_restart_succeeds() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    dispatch_switch(&h).await;

    // Agent exits 0 and goes away for the restart
    h.lifecycle.handle_command_complete(&hid("h-1"), "switch", 0, None);
    assert_eq!(last_command(&h, "h-1").status, CommandStatus::AwaitingReconnect);

    // The replacement binary reconnects with a new hash
    reconnect(&h, fresh("commit-b", "hash-y"), AgentReported::Ok);

    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::Success);
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn stale_binary_is_detected() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    dispatch_switch(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "switch", 0, None);

    // Reconnects with a NEW source commit but the SAME binary
    reconnect(&h, fresh("commit-b", "hash-x"), AgentReported::Ok);

    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::Suspicious);

    // And with nothing changed at all: stale binary
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    dispatch_switch(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "switch", 0, None);
    reconnect(&h, fresh("commit-a", "hash-x"), AgentReported::Ok);

    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::StaleBinary);
    assert!(row.error.unwrap().message.contains("old binary"));
    assert!(pending(&h, "h-1").is_none());
}

#[tokio::test]
async fn reconnect_timeout_fails_the_switch() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    dispatch_switch(&h).await;
    h.lifecycle.handle_command_complete(&hid("h-1"), "switch", 0, None);

    // The agent never comes back
    h.clock.advance(Duration::from_secs(150));
    h.tick();

    let row = last_command(&h, "h-1");
    assert_eq!(row.status, CommandStatus::Timeout);
    let err = row.error.unwrap();
    assert!(err.message.contains("agent did not reconnect"));
    assert!(pending(&h, "h-1").is_none());
}
