// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-host deploy with one pull failure: the spec's pipeline scenario.

use super::prelude::*;

/// Walk one host through a successful switch stage (exit 0, reconnect with
/// a fresh binary, system ok).
fn complete_switch(h: &Harness, host: &str) {
    h.lifecycle.handle_command_complete(&hid(host), "switch", 0, None);
    let mut row = fleet_core::test_support::host(host);
    row.freshness = Some(Freshness {
        source_commit: Some("commit-b".into()),
        store_path: Some("/nix/store/new".into()),
        binary_hash: Some("hash-new".into()),
    });
    h.apply(Event::HostRegistered { host: row });
    h.lifecycle.handle_agent_reconnect(&hid(host));
}

#[tokio::test]
async fn deploy_with_one_pull_failure_is_partial() {
    let h = harness();
    for host in ["a", "b", "c"] {
        h.add_host(host);
        h.remote_current();
        behind_remote(&h, host);
        // Freshness baseline for the switch stage
        h.apply(Event::HostSeen {
            id: hid(host),
            at_ms: h.clock.epoch_ms(),
            generation: Some("commit-old".into()),
            metrics: None,
            lock_status: Some(AgentReported::Outdated),
            system_status: Some(AgentReported::Outdated),
            tests_status: None,
            tests_generation: None,
            freshness: Some(Freshness {
                source_commit: Some("commit-old".into()),
                store_path: Some("/nix/store/old".into()),
                binary_hash: Some("hash-old".into()),
            }),
        });
    }

    let pipeline = h
        .pipelines
        .dispatch("deploy", &[hid("a"), hid("b"), hid("c")], false, "admin", &h.lifecycle)
        .await
        .unwrap();

    // Stage 0: pull on all three; c fails
    for host in ["a", "b"] {
        h.lifecycle.handle_command_complete(&hid(host), "pull", 0, None);
        heartbeat(&h, host, "commit-a", AgentReported::Ok, AgentReported::Outdated);
    }
    h.lifecycle.handle_command_complete(&hid("c"), "pull", 1, None);
    h.pump().await;

    {
        let state = h.state.lock();
        let row = state.pipelines.get(&pipeline.id).unwrap();
        assert_eq!(row.current_stage, 1, "survivors advanced to the switch stage");
        assert_eq!(row.dropped.get(&hid("c")), Some(&0), "c dropped at its pull stage");
    }

    // Stage 1: switch on a and b only
    for host in ["a", "b"] {
        complete_switch(&h, host);
    }
    h.pump().await;

    // Stage 2: test on a and b
    for host in ["a", "b"] {
        h.lifecycle.handle_command_complete(&hid(host), "test", 0, None);
        h.apply(Event::HostSeen {
            id: hid(host),
            at_ms: h.clock.epoch_ms(),
            generation: Some("commit-a".into()),
            metrics: None,
            lock_status: Some(AgentReported::Ok),
            system_status: Some(AgentReported::Ok),
            tests_status: Some(AgentReported::Ok),
            tests_generation: Some("commit-a".into()),
            freshness: None,
        });
        h.lifecycle.handle_heartbeat(&hid(host));
    }
    h.pump().await;

    let state = h.state.lock();
    let row = state.pipelines.get(&pipeline.id).unwrap();
    assert_eq!(row.status, PipelineStatus::Partial);
    assert_eq!(row.dropped.len(), 1);

    // c never received stage-1 or stage-2 commands
    let c_ops: Vec<String> = state
        .commands
        .values()
        .filter(|c| c.host_id == hid("c"))
        .map(|c| c.op_id.clone())
        .collect();
    assert_eq!(c_ops, vec!["pull".to_string()]);
}

#[tokio::test]
async fn per_host_transitions_stay_totally_ordered() {
    let h = harness();
    h.add_host("a");
    h.remote_current();
    behind_remote(&h, "a");

    let pipeline = h
        .pipelines
        .dispatch("verify", &[hid("a")], false, "admin", &h.lifecycle)
        .await
        .unwrap();

    // At every moment at most one non-terminal command exists for the host
    for op in ["refresh-git", "refresh-lock", "refresh-system"] {
        let active: Vec<_> = {
            let state = h.state.lock();
            state
                .commands
                .values()
                .filter(|c| !c.is_terminal() && c.host_id == hid("a"))
                .cloned()
                .collect()
        };
        assert_eq!(active.len(), 1, "single-flight violated at {op}");
        assert_eq!(active[0].op_id, op);

        h.lifecycle.handle_command_complete(&hid("a"), op, 0, None);
        h.pump().await;
    }

    let state = h.state.lock();
    assert_eq!(state.pipelines.get(&pipeline.id).unwrap().status, PipelineStatus::Complete);
}
