// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-sync building blocks: the derived-state view behind init/full_state
//! payloads, and the bounded broadcast queue feeding the hub.

use fleet_core::{Clock, Host, SystemClock};
use fleet_engine::{Evaluator, OpRegistry};
use fleet_storage::MaterializedState;
use fleet_wire::{Change, FullState, HostView};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// Events kept in a full-state payload.
const FULL_STATE_EVENTS: usize = 100;
/// Recent command/pipeline rows in a full-state payload.
const FULL_STATE_RECENT: usize = 50;

/// Read-only lens over the store that derives everything browsers see.
/// Both delta emission and full-state construction go through here, so the
/// remote-gate rule cannot diverge between the two paths.
pub struct StateView {
    pub state: Arc<Mutex<MaterializedState>>,
    pub evaluator: Arc<Evaluator>,
    pub registry: Arc<OpRegistry>,
    pub clock: SystemClock,
    pub dashboard_version: String,
}

impl StateView {
    pub fn clock_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Derived view of one host row.
    pub fn host_view(&self, host: &Host) -> HostView {
        let (remote, active_status) = {
            let state = self.state.lock();
            let active = state.active_command_for(&host.id).map(|c| c.status);
            (state.remote.clone(), active)
        };
        let compartments = self.evaluator.evaluate(host, &remote, self.clock.epoch_ms());
        let update_status = compartments.overall();
        let available_ops = self.registry.available_ops(host, &compartments, active_status);
        HostView { host: host.clone(), compartments, update_status, available_ops }
    }

    /// A full host-view object serialized as a field map, used as the
    /// `host_updated` payload. Sending the complete field set keeps client
    /// merges trivial and cannot under-report a compartment change.
    pub fn host_fields(&self, host: &Host) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self.host_view(host)) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Complete state snapshot for `init` and `full_state` frames.
    pub fn full_state(&self) -> FullState {
        let rows: Vec<Host> = {
            let state = self.state.lock();
            state.host_rows().into_iter().cloned().collect()
        };
        let hosts: Vec<HostView> = rows.iter().map(|h| self.host_view(h)).collect();

        let state = self.state.lock();
        FullState {
            hosts,
            active_commands: state.active_commands().into_iter().cloned().collect(),
            recent_commands: state
                .recent_commands(FULL_STATE_RECENT)
                .into_iter()
                .cloned()
                .collect(),
            active_pipelines: state.active_pipelines().into_iter().cloned().collect(),
            recent_pipelines: state
                .recent_pipelines(FULL_STATE_RECENT)
                .into_iter()
                .cloned()
                .collect(),
            events: state.recent_events(FULL_STATE_EVENTS).into_iter().cloned().collect(),
            dashboard_version: self.dashboard_version.clone(),
        }
    }
}

/// Broadcast queue capacity.
const BROADCAST_CAP: usize = 1024;

/// Bounded delta queue between producers (engine loop, connection tasks) and
/// the hub. Overflow drops the oldest delta and schedules a sync beacon so
/// clients resync instead of silently missing changes.
#[derive(Clone)]
pub struct Broadcaster {
    queue: Arc<Mutex<VecDeque<Change>>>,
    notify: Arc<Notify>,
    beacon_due: Arc<AtomicBool>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            beacon_due: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn publish(&self, change: Change) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= BROADCAST_CAP {
                queue.pop_front();
                self.beacon_due.store(true, Ordering::SeqCst);
                warn!("broadcast queue overflow, dropped oldest delta");
            }
            queue.push_back(change);
        }
        self.notify.notify_one();
    }

    pub fn publish_all(&self, changes: Vec<Change>) {
        for change in changes {
            self.publish(change);
        }
    }

    /// Wait for and drain pending deltas. Returns `(changes, beacon_due)`.
    pub async fn drain(&self) -> (Vec<Change>, bool) {
        loop {
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() || self.beacon_due.load(Ordering::SeqCst) {
                    let changes: Vec<Change> = queue.drain(..).collect();
                    let beacon = self.beacon_due.swap(false, Ordering::SeqCst);
                    return (changes, beacon);
                }
            }
            self.notify.notified().await;
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
