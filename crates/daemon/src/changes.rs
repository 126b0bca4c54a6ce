// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store event → browser delta translation.
//!
//! Runs in the engine loop, so deltas are emitted in WAL order and every
//! compartment-bearing payload is re-derived through the evaluator.

use crate::sync::StateView;
use fleet_core::{CommandId, Event, HostId};
use fleet_wire::{Change, Progress};

pub fn translate(view: &StateView, event: &Event) -> Vec<Change> {
    match event {
        Event::HostRegistered { host } => {
            let row = current_host(view, &host.id);
            match row {
                Some(row) => vec![Change::HostAdded { host: Box::new(view.host_view(&row)) }],
                None => vec![],
            }
        }
        Event::HostSeen { id, .. }
        | Event::HostOffline { id, .. }
        | Event::HostColorSet { id, .. }
        | Event::PendingCleared { id } => host_updated(view, id),
        Event::HostRemoved { id } => vec![Change::HostRemoved { id: id.clone() }],

        // Rows become visible to browsers when they start executing (or
        // terminally, for blocked and control rows).
        Event::CommandCreated { .. } => vec![],
        Event::CommandStarted { id, host_id, .. } => {
            let mut changes = command_row(view, id, |c| Change::CommandStarted { command: c });
            changes.extend(host_updated(view, host_id));
            changes
        }
        Event::CommandWarning { id, .. }
        | Event::CommandTimeoutPending { id, .. }
        | Event::CommandExtended { id, .. }
        | Event::CommandAwaitingReconnect { id, .. }
        | Event::CommandKilling { id, .. } => status_progress(view, id),
        Event::CommandBlocked { id, .. } => {
            command_row(view, id, |c| Change::CommandFinished { command: c })
        }
        Event::CommandFinished { id, host_id, .. } => {
            let mut changes = command_row(view, id, |c| Change::CommandFinished { command: c });
            changes.extend(host_updated(view, host_id));
            changes
        }

        // Pipelines surface through their per-host command deltas and the
        // audit trail; full state carries the rows themselves.
        Event::PipelineCreated { .. }
        | Event::PipelineStageStarted { .. }
        | Event::PipelineHostDropped { .. }
        | Event::PipelineFinished { .. } => vec![],

        // The remote gate moved: every host's compartments may have changed.
        Event::RemoteVersionFetched { .. } | Event::RemoteVersionFailed { .. } => {
            let rows: Vec<_> = {
                let state = view.state.lock();
                state.host_rows().into_iter().cloned().collect()
            };
            rows.iter()
                .map(|row| Change::HostUpdated {
                    id: row.id.clone(),
                    fields: view.host_fields(row),
                })
                .collect()
        }

        Event::Logged { entry } => vec![Change::Event { entry: entry.clone() }],
    }
}

fn current_host(view: &StateView, id: &HostId) -> Option<fleet_core::Host> {
    view.state.lock().host(id).cloned()
}

fn host_updated(view: &StateView, id: &HostId) -> Vec<Change> {
    match current_host(view, id) {
        Some(row) => {
            vec![Change::HostUpdated { id: id.clone(), fields: view.host_fields(&row) }]
        }
        None => vec![],
    }
}

fn command_row(
    view: &StateView,
    id: &CommandId,
    wrap: impl Fn(fleet_core::Command) -> Change,
) -> Vec<Change> {
    match view.state.lock().command(id).cloned() {
        Some(row) => vec![wrap(row)],
        None => vec![],
    }
}

fn status_progress(view: &StateView, id: &CommandId) -> Vec<Change> {
    match view.state.lock().command(id).cloned() {
        Some(row) => vec![Change::CommandProgress {
            command: row.id.clone(),
            host_id: row.host_id.clone(),
            progress: Progress::Status { status: row.status },
        }],
        None => vec![],
    }
}

#[cfg(test)]
#[path = "changes_tests.rs"]
mod tests;
