// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting invariants from the control-plane contract.

use super::prelude::*;

/// Invariants 1 and 2: one non-terminal command per host, and the pending
/// marker tracks exactly that command's op.
fn assert_single_flight(h: &Harness) {
    let state = h.state.lock();
    for host in state.hosts.values() {
        let active: Vec<_> = state
            .commands
            .values()
            .filter(|c| c.host_id == host.id && !c.is_terminal())
            .collect();
        assert!(active.len() <= 1, "{} has {} active commands", host.id, active.len());
        match active.first() {
            Some(cmd) => assert_eq!(host.pending_command.as_deref(), Some(cmd.op_id.as_str())),
            None => assert!(host.pending_command.is_none()),
        }
    }
}

#[tokio::test]
async fn single_flight_and_pending_marker_hold_across_a_workload() {
    let h = harness();
    for host in ["a", "b"] {
        h.add_host(host);
    }
    h.remote_current();
    assert_single_flight(&h);

    for host in ["a", "b"] {
        behind_remote(&h, host);
        h.lifecycle.execute_op("pull", &hid(host), false, None, "admin", &no_args()).await.unwrap();
        assert_single_flight(&h);

        // Competing dispatches bounce without disturbing the marker
        let _ = h.lifecycle.execute_op("test", &hid(host), false, None, "admin", &no_args()).await;
        assert_single_flight(&h);
    }

    h.lifecycle.handle_command_complete(&hid("a"), "pull", 0, None);
    assert_single_flight(&h);
    heartbeat(&h, "a", "commit-a", AgentReported::Ok, AgentReported::Ok);
    assert_single_flight(&h);

    h.lifecycle.handle_command_complete(&hid("b"), "pull", 2, None);
    assert_single_flight(&h);

    // Immediately redispatchable after terminal states
    h.lifecycle.execute_op("test", &hid("b"), false, None, "admin", &no_args()).await.unwrap();
    assert_single_flight(&h);
}

/// Invariant 7: the deciding signal is never older than the completion.
#[tokio::test]
async fn post_check_waits_for_a_fresh_signal() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");

    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    // A heartbeat BEFORE completion must not decide anything
    heartbeat(&h, "h-1", "commit-old", AgentReported::Outdated, AgentReported::Outdated);
    assert_eq!(last_command(&h, "h-1").status, CommandStatus::Executing);

    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);
    assert!(h.lifecycle.has_active(&hid("h-1")), "still awaiting a post-completion signal");

    // Only the heartbeat arriving after completion settles it
    heartbeat(&h, "h-1", "commit-a", AgentReported::Ok, AgentReported::Ok);
    assert_eq!(last_command(&h, "h-1").status, CommandStatus::Success);
}

/// Round-trip: rows and events survive JSON serialization inside WAL lines.
#[tokio::test]
async fn wal_lines_round_trip_all_emitted_events() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");
    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();
    h.lifecycle.handle_command_complete(&hid("h-1"), "pull", 0, None);
    heartbeat(&h, "h-1", "commit-a", AgentReported::Ok, AgentReported::Ok);

    let entries = h.wal.lock().entries_after(0).unwrap();
    assert!(entries.len() > 5);
    for entry in entries {
        let json = serde_json::to_string(&entry.event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry.event);
    }
}
