// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state derived from WAL replay.

mod commands;
mod hosts;
mod log;
mod pipelines;

use fleet_core::{
    Command, CommandId, Event, Host, HostId, LogEntry, Pipeline, PipelineId, RemoteState,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum audit entries retained (FIFO).
pub const EVENT_LOG_CAP: usize = 10_000;

/// All durable rows, derived from events.
///
/// # Idempotency requirement
///
/// Every event handler MUST be idempotent: applying the same event twice
/// must land in the same state as applying it once. Events are applied once
/// at emission time for immediate visibility and again when the engine loop
/// drains the WAL, and recovery may overlap a snapshot with replay.
///
/// Handler guidelines:
/// - assign (`=`), never accumulate (`+=`)
/// - guard terminal command transitions with `is_terminal()` (write-once)
/// - guard inserts with existence checks
/// - keep `current_stage` monotonic with `max`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub hosts: HashMap<HostId, Host>,
    pub commands: HashMap<CommandId, Command>,
    pub pipelines: HashMap<PipelineId, Pipeline>,
    /// Bounded audit trail, oldest first.
    #[serde(default)]
    pub events: VecDeque<LogEntry>,
    /// Remote desired-state mirror. Replayed values may be stale; the
    /// evaluator applies the TTL before trusting them.
    #[serde(default)]
    pub remote: RemoteState,
}

impl MaterializedState {
    /// Apply an event to derive state changes. Events are facts; state is a
    /// pure function of the event sequence.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::HostRegistered { .. }
            | Event::HostSeen { .. }
            | Event::HostOffline { .. }
            | Event::HostRemoved { .. }
            | Event::HostColorSet { .. }
            | Event::PendingCleared { .. } => hosts::apply(self, event),

            Event::CommandCreated { .. }
            | Event::CommandBlocked { .. }
            | Event::CommandStarted { .. }
            | Event::CommandWarning { .. }
            | Event::CommandTimeoutPending { .. }
            | Event::CommandExtended { .. }
            | Event::CommandAwaitingReconnect { .. }
            | Event::CommandKilling { .. }
            | Event::CommandFinished { .. } => commands::apply(self, event),

            Event::PipelineCreated { .. }
            | Event::PipelineStageStarted { .. }
            | Event::PipelineHostDropped { .. }
            | Event::PipelineFinished { .. } => pipelines::apply(self, event),

            Event::RemoteVersionFetched { .. }
            | Event::RemoteVersionFailed { .. }
            | Event::Logged { .. } => log::apply(self, event),
        }
    }

    pub fn host(&self, id: &HostId) -> Option<&Host> {
        self.hosts.get(id)
    }

    pub fn command(&self, id: &CommandId) -> Option<&Command> {
        self.commands.get(id)
    }

    /// Non-terminal commands, the recovery set after a restart.
    pub fn active_commands(&self) -> Vec<&Command> {
        let mut active: Vec<_> = self.commands.values().filter(|c| !c.is_terminal()).collect();
        active.sort_by_key(|c| c.created_at_ms);
        active
    }

    /// The non-terminal command for a host, if any. At most one exists.
    pub fn active_command_for(&self, host: &HostId) -> Option<&Command> {
        self.commands.values().find(|c| &c.host_id == host && !c.is_terminal())
    }

    /// Most recent commands, newest first.
    pub fn recent_commands(&self, limit: usize) -> Vec<&Command> {
        let mut rows: Vec<_> = self.commands.values().collect();
        rows.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        rows.truncate(limit);
        rows
    }

    pub fn active_pipelines(&self) -> Vec<&Pipeline> {
        let mut rows: Vec<_> = self.pipelines.values().filter(|p| !p.is_terminal()).collect();
        rows.sort_by_key(|p| p.created_at_ms);
        rows
    }

    /// Most recent terminal pipelines, newest first.
    pub fn recent_pipelines(&self, limit: usize) -> Vec<&Pipeline> {
        let mut rows: Vec<_> = self.pipelines.values().filter(|p| p.is_terminal()).collect();
        rows.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        rows.truncate(limit);
        rows
    }

    /// Last `limit` audit entries, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<&LogEntry> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).collect()
    }

    /// Host list sorted by hostname for stable UI ordering.
    pub fn host_rows(&self) -> Vec<&Host> {
        let mut rows: Vec<_> = self.hosts.values().collect();
        rows.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        rows
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
