// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline row event handlers.

use super::MaterializedState;
use fleet_core::Event;

pub(super) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::PipelineCreated { pipeline } => {
            if !state.pipelines.contains_key(&pipeline.id) {
                state.pipelines.insert(pipeline.id.clone(), pipeline.clone());
            }
        }
        Event::PipelineStageStarted { id, stage } => {
            if let Some(p) = state.pipelines.get_mut(id) {
                // current_stage is monotonic
                p.current_stage = p.current_stage.max(*stage);
            }
        }
        Event::PipelineHostDropped { id, host_id, stage } => {
            if let Some(p) = state.pipelines.get_mut(id) {
                p.dropped.entry(host_id.clone()).or_insert(*stage);
            }
        }
        Event::PipelineFinished { id, status, at_ms } => {
            let Some(p) = state.pipelines.get_mut(id) else { return };
            if p.is_terminal() {
                return;
            }
            p.status = *status;
            p.finished_at_ms = Some(*at_ms);
        }
        _ => {}
    }
}
