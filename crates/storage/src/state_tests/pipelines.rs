// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::hid;
use crate::MaterializedState;
use fleet_core::{Event, Pipeline, PipelineId, PipelineStatus};

fn pid(id: &str) -> PipelineId {
    PipelineId::new(id)
}

fn created(state: &mut MaterializedState) {
    state.apply_event(&Event::PipelineCreated {
        pipeline: Pipeline {
            id: pid("p-1"),
            name: "deploy".into(),
            ops: vec!["pull".into(), "switch".into(), "test".into()],
            hosts: vec![hid("a"), hid("b")],
            current_stage: 0,
            status: PipelineStatus::Running,
            created_at_ms: 1,
            finished_at_ms: None,
            dropped: Default::default(),
        },
    });
}

#[test]
fn stage_is_monotonic() {
    let mut state = MaterializedState::default();
    created(&mut state);

    state.apply_event(&Event::PipelineStageStarted { id: pid("p-1"), stage: 2 });
    assert_eq!(state.pipelines[&pid("p-1")].current_stage, 2);

    // Replay of an earlier stage start cannot move the pipeline backwards
    state.apply_event(&Event::PipelineStageStarted { id: pid("p-1"), stage: 1 });
    assert_eq!(state.pipelines[&pid("p-1")].current_stage, 2);
}

#[test]
fn dropped_host_keeps_first_drop_stage() {
    let mut state = MaterializedState::default();
    created(&mut state);

    state.apply_event(&Event::PipelineHostDropped { id: pid("p-1"), host_id: hid("a"), stage: 0 });
    state.apply_event(&Event::PipelineHostDropped { id: pid("p-1"), host_id: hid("a"), stage: 2 });

    assert_eq!(state.pipelines[&pid("p-1")].dropped[&hid("a")], 0);
}

#[test]
fn finished_is_write_once() {
    let mut state = MaterializedState::default();
    created(&mut state);

    state.apply_event(&Event::PipelineFinished {
        id: pid("p-1"),
        status: PipelineStatus::Partial,
        at_ms: 9,
    });
    state.apply_event(&Event::PipelineFinished {
        id: pid("p-1"),
        status: PipelineStatus::Failed,
        at_ms: 10,
    });

    let p = &state.pipelines[&pid("p-1")];
    assert_eq!(p.status, PipelineStatus::Partial);
    assert_eq!(p.finished_at_ms, Some(9));
}

#[test]
fn active_and_recent_queries() {
    let mut state = MaterializedState::default();
    created(&mut state);
    assert_eq!(state.active_pipelines().len(), 1);
    assert!(state.recent_pipelines(10).is_empty());

    state.apply_event(&Event::PipelineFinished {
        id: pid("p-1"),
        status: PipelineStatus::Complete,
        at_ms: 2,
    });
    assert!(state.active_pipelines().is_empty());
    assert_eq!(state.recent_pipelines(10).len(), 1);
}
