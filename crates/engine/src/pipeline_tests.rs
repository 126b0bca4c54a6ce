// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{harness, Harness};
use fleet_core::{CommandStatus, ErrorCode, PipelineStatus};

fn hid(id: &str) -> HostId {
    HostId::new(id)
}

/// Two online hosts, remote current. The `verify` pipeline (refresh probes,
/// no deferred post-checks) keeps stage mechanics observable.
fn two_hosts() -> Harness {
    let h = harness();
    h.add_host("a");
    h.add_host("b");
    h.remote_current();
    h
}

async fn dispatch_verify(h: &Harness) -> Pipeline {
    h.pipelines
        .dispatch("verify", &[hid("a"), hid("b")], false, "admin", &h.lifecycle)
        .await
        .unwrap()
}

fn pipeline_row(h: &Harness, id: &PipelineId) -> Pipeline {
    h.state.lock().pipelines.get(id).cloned().unwrap()
}

#[tokio::test]
async fn unknown_pipeline_is_rejected() {
    let h = two_hosts();
    let err = h
        .pipelines
        .dispatch("nope", &[hid("a")], false, "admin", &h.lifecycle)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownOp);
}

#[tokio::test]
async fn stages_advance_when_all_hosts_succeed() {
    let h = two_hosts();
    let p = dispatch_verify(&h).await;
    assert_eq!(p.status, PipelineStatus::Running);
    assert_eq!(p.current_stage, 0);

    for (stage, op) in ["refresh-git", "refresh-lock", "refresh-system"].iter().enumerate() {
        assert_eq!(pipeline_row(&h, &p.id).current_stage, stage);
        h.lifecycle.handle_command_complete(&hid("a"), op, 0, None);
        h.lifecycle.handle_command_complete(&hid("b"), op, 0, None);
        h.pump().await;
    }

    let row = pipeline_row(&h, &p.id);
    assert_eq!(row.status, PipelineStatus::Complete);
    assert!(row.dropped.is_empty());
    assert!(row.finished_at_ms.is_some());
}

#[tokio::test]
async fn failed_host_drops_off_and_pipeline_is_partial() {
    let h = two_hosts();
    let p = dispatch_verify(&h).await;

    h.lifecycle.handle_command_complete(&hid("a"), "refresh-git", 0, None);
    h.lifecycle.handle_command_complete(&hid("b"), "refresh-git", 1, None);
    h.pump().await;

    let row = pipeline_row(&h, &p.id);
    assert_eq!(row.dropped.get(&hid("b")), Some(&0));
    assert_eq!(row.current_stage, 1);

    // Later stages only run on the survivor
    h.lifecycle.handle_command_complete(&hid("a"), "refresh-lock", 0, None);
    h.pump().await;
    h.lifecycle.handle_command_complete(&hid("a"), "refresh-system", 0, None);
    h.pump().await;

    let row = pipeline_row(&h, &p.id);
    assert_eq!(row.status, PipelineStatus::Partial);
    // The dropped host never got stage 1+ commands
    let b_ops: Vec<String> = {
        let state = h.state.lock();
        state
            .commands
            .values()
            .filter(|c| c.host_id == hid("b"))
            .map(|c| c.op_id.clone())
            .collect()
    };
    assert_eq!(b_ops, vec!["refresh-git".to_string()]);
}

#[tokio::test]
async fn empty_active_set_fails_the_pipeline() {
    let h = two_hosts();
    let p = dispatch_verify(&h).await;

    h.lifecycle.handle_command_complete(&hid("a"), "refresh-git", 1, None);
    h.lifecycle.handle_command_complete(&hid("b"), "refresh-git", 1, None);
    h.pump().await;

    assert_eq!(pipeline_row(&h, &p.id).status, PipelineStatus::Failed);
}

#[tokio::test]
async fn validation_blocked_hosts_drop_at_dispatch() {
    let h = two_hosts();
    h.apply(fleet_core::Event::HostOffline { id: hid("b"), at_ms: h.clock.epoch_ms() });

    let p = dispatch_verify(&h).await;

    let row = pipeline_row(&h, &p.id);
    assert_eq!(row.dropped.get(&hid("b")), Some(&0));
    // Survivor still runs
    assert!(h.lifecycle.has_active(&hid("a")));
    assert_eq!(row.status, PipelineStatus::Running);
}

#[tokio::test]
async fn cancel_skips_active_commands() {
    let h = two_hosts();
    let p = dispatch_verify(&h).await;

    h.pipelines.cancel(&p.id, "admin", &h.lifecycle).unwrap();

    let row = pipeline_row(&h, &p.id);
    assert_eq!(row.status, PipelineStatus::Cancelled);
    assert!(!h.lifecycle.has_active(&hid("a")));
    assert!(!h.lifecycle.has_active(&hid("b")));

    let skipped = {
        let state = h.state.lock();
        state
            .commands
            .values()
            .filter(|c| c.status == CommandStatus::Skipped)
            .count()
    };
    assert_eq!(skipped, 2);

    // Late completions for a cancelled pipeline change nothing
    h.pump().await;
    assert_eq!(pipeline_row(&h, &p.id).status, PipelineStatus::Cancelled);
}

#[tokio::test]
async fn duplicate_hosts_are_deduplicated() {
    let h = two_hosts();
    let p = h
        .pipelines
        .dispatch("verify", &[hid("a"), hid("a"), hid("b")], false, "admin", &h.lifecycle)
        .await
        .unwrap();
    assert_eq!(p.hosts.len(), 2);
}
