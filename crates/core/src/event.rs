// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store events and the audit log entry.
//!
//! Events are facts appended to the WAL before state mutates; the
//! materialized state is derived by replay. Every handler in
//! `fleet_storage::state` must be idempotent because events are applied once
//! for immediate visibility and again when the engine loop drains the WAL.

use crate::command::{Command, CommandError, CommandId, CommandStatus};
use crate::error::ErrorCode;
use crate::host::{AgentReported, Freshness, Host, HostId, HostMetrics};
use crate::pipeline::{Pipeline, PipelineId, PipelineStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Success => "success",
        };
        write!(f, "{s}")
    }
}

/// One row of the append-only audit trail shown to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique id, used to deduplicate double-applied `Logged` events.
    pub id: String,
    pub at_ms: u64,
    pub category: String,
    pub level: LogLevel,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<HostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Everything that can change durable state, plus the audit trail.
///
/// Variants are additive; old WAL files must keep replaying, so fields added
/// later carry `#[serde(default)]` on their structs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Hosts
    HostRegistered {
        host: Host,
    },
    /// Heartbeat. Informational: never touches `pending_command`.
    HostSeen {
        id: HostId,
        at_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<HostMetrics>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lock_status: Option<AgentReported>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_status: Option<AgentReported>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tests_status: Option<AgentReported>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tests_generation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        freshness: Option<Freshness>,
    },
    HostOffline {
        id: HostId,
        at_ms: u64,
    },
    HostRemoved {
        id: HostId,
    },
    HostColorSet {
        id: HostId,
        color: String,
    },
    /// Stale-cleanup reconciliation: clears an orphaned `pending_command`.
    /// Emitted by the Lifecycle Manager only when no active command exists.
    PendingCleared {
        id: HostId,
    },

    // Commands (Lifecycle Manager only)
    CommandCreated {
        command: Command,
    },
    CommandBlocked {
        id: CommandId,
        code: ErrorCode,
        message: String,
        at_ms: u64,
    },
    /// Validation passed, command sent: sets `pending_command` on the host.
    CommandStarted {
        id: CommandId,
        host_id: HostId,
        op_id: String,
        at_ms: u64,
    },
    CommandWarning {
        id: CommandId,
        at_ms: u64,
    },
    CommandTimeoutPending {
        id: CommandId,
        at_ms: u64,
    },
    CommandExtended {
        id: CommandId,
        minutes: u64,
        at_ms: u64,
    },
    CommandAwaitingReconnect {
        id: CommandId,
        deadline_ms: u64,
    },
    CommandKilling {
        id: CommandId,
        signal: String,
        at_ms: u64,
    },
    /// Terminal transition: write-once, clears `pending_command`.
    CommandFinished {
        id: CommandId,
        host_id: HostId,
        status: CommandStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<CommandError>,
        at_ms: u64,
    },

    // Pipelines
    PipelineCreated {
        pipeline: Pipeline,
    },
    PipelineStageStarted {
        id: PipelineId,
        stage: usize,
    },
    PipelineHostDropped {
        id: PipelineId,
        host_id: HostId,
        stage: usize,
    },
    PipelineFinished {
        id: PipelineId,
        status: PipelineStatus,
        at_ms: u64,
    },

    // Remote desired state
    RemoteVersionFetched {
        git_commit: String,
        lock_hash: String,
        at_ms: u64,
    },
    RemoteVersionFailed {
        error: String,
        at_ms: u64,
    },

    // Audit trail
    Logged {
        entry: LogEntry,
    },
}

impl Event {
    /// Short name for tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HostRegistered { .. } => "host_registered",
            Self::HostSeen { .. } => "host_seen",
            Self::HostOffline { .. } => "host_offline",
            Self::HostRemoved { .. } => "host_removed",
            Self::HostColorSet { .. } => "host_color_set",
            Self::PendingCleared { .. } => "pending_cleared",
            Self::CommandCreated { .. } => "command_created",
            Self::CommandBlocked { .. } => "command_blocked",
            Self::CommandStarted { .. } => "command_started",
            Self::CommandWarning { .. } => "command_warning",
            Self::CommandTimeoutPending { .. } => "command_timeout_pending",
            Self::CommandExtended { .. } => "command_extended",
            Self::CommandAwaitingReconnect { .. } => "command_awaiting_reconnect",
            Self::CommandKilling { .. } => "command_killing",
            Self::CommandFinished { .. } => "command_finished",
            Self::PipelineCreated { .. } => "pipeline_created",
            Self::PipelineStageStarted { .. } => "pipeline_stage_started",
            Self::PipelineHostDropped { .. } => "pipeline_host_dropped",
            Self::PipelineFinished { .. } => "pipeline_finished",
            Self::RemoteVersionFetched { .. } => "remote_version_fetched",
            Self::RemoteVersionFailed { .. } => "remote_version_failed",
            Self::Logged { .. } => "logged",
        }
    }

    /// Host this event concerns, when it concerns exactly one.
    pub fn host_id(&self) -> Option<&HostId> {
        match self {
            Self::HostRegistered { host } => Some(&host.id),
            Self::HostSeen { id, .. }
            | Self::HostOffline { id, .. }
            | Self::HostRemoved { id }
            | Self::HostColorSet { id, .. }
            | Self::PendingCleared { id } => Some(id),
            Self::CommandCreated { command } => Some(&command.host_id),
            Self::CommandStarted { host_id, .. } | Self::CommandFinished { host_id, .. } => {
                Some(host_id)
            }
            Self::PipelineHostDropped { host_id, .. } => Some(host_id),
            Self::Logged { entry } => entry.host_id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
