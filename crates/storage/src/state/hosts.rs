// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host row event handlers.

use super::MaterializedState;
use fleet_core::{Event, HostStatus};

pub(super) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::HostRegistered { host } => {
            // Rotation keeps the lifecycle-owned pending_command: a register
            // mid-switch must not wipe the in-flight marker.
            let pending = state.hosts.get(&host.id).and_then(|h| h.pending_command.clone());
            let mut row = host.clone();
            row.pending_command = pending;
            state.hosts.insert(row.id.clone(), row);
        }
        Event::HostSeen {
            id,
            at_ms,
            generation,
            metrics,
            lock_status,
            system_status,
            tests_status,
            tests_generation,
            freshness,
        } => {
            let Some(host) = state.hosts.get_mut(id) else { return };
            host.status = HostStatus::Online;
            host.last_seen_ms = *at_ms;
            if let Some(generation) = generation {
                host.generation = Some(generation.clone());
            }
            if let Some(metrics) = metrics {
                host.metrics = Some(metrics.clone());
            }
            if let Some(lock) = lock_status {
                host.lock_status = *lock;
            }
            if let Some(system) = system_status {
                host.system_status = *system;
            }
            if let Some(tests) = tests_status {
                host.tests_status = *tests;
            }
            if let Some(tests_generation) = tests_generation {
                host.tests_generation = Some(tests_generation.clone());
            }
            if let Some(freshness) = freshness {
                host.freshness = Some(freshness.clone());
            }
        }
        Event::HostOffline { id, .. } => {
            if let Some(host) = state.hosts.get_mut(id) {
                host.status = HostStatus::Offline;
            }
        }
        Event::HostRemoved { id } => {
            state.hosts.remove(id);
        }
        Event::HostColorSet { id, color } => {
            if let Some(host) = state.hosts.get_mut(id) {
                host.theme_color = Some(color.clone());
            }
        }
        Event::PendingCleared { id } => {
            if let Some(host) = state.hosts.get_mut(id) {
                host.pending_command = None;
            }
        }
        _ => {}
    }
}
