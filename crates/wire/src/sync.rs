// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser channel: versioned init / delta / sync-beacon protocol.
//!
//! Every server frame is `{type, version, payload}`. `version` is a
//! process-wide monotonic counter; a client that observes a gap (or a beacon
//! with a different version) requests `get_state`.

use crate::agent::{OperationProgressPayload, OutputStream, TestProgressPayload};
use fleet_core::{
    Command, CommandId, CommandStatus, Compartments, CompartmentStatus, Host, HostId, LogEntry,
    Pipeline,
};
use serde::{Deserialize, Serialize};

/// A versioned frame sent to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub version: u64,
    #[serde(flatten)]
    pub body: SyncBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyncBody {
    /// First frame on every connection.
    Init(FullState),
    /// Incremental change; version is previous + 1.
    Delta(Change),
    /// Reply to `get_state`; same shape as `init`.
    FullState(FullState),
    /// Periodic version beacon for drift detection.
    Sync,
}

impl SyncMessage {
    pub fn new(version: u64, body: SyncBody) -> Self {
        Self { version, body }
    }
}

/// The only message browsers may send over the socket. All mutations go
/// through HTTP `POST /dispatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserToServer {
    GetState,
}

/// A host as browsers see it: the row plus everything the server derives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostView {
    #[serde(flatten)]
    pub host: Host,
    pub compartments: Compartments,
    /// Worst compartment, for the summary badge.
    pub update_status: CompartmentStatus,
    /// Ops this host can accept right now. Server-computed; the client
    /// renders exactly what is listed and nothing else.
    pub available_ops: Vec<String>,
}

/// Typed incremental change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    HostAdded {
        host: Box<HostView>,
    },
    HostUpdated {
        id: HostId,
        /// Partial host-view object; clients merge it over their copy.
        fields: serde_json::Map<String, serde_json::Value>,
    },
    HostRemoved {
        id: HostId,
    },
    CommandStarted {
        command: Command,
    },
    CommandProgress {
        command: CommandId,
        host_id: HostId,
        progress: Progress,
    },
    CommandFinished {
        command: Command,
    },
    Event {
        entry: LogEntry,
    },
}

/// What kind of progress a `command_progress` delta carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    Output { line: String, stream: OutputStream },
    Test(TestProgressPayload),
    Operation(OperationProgressPayload),
    /// Non-terminal status change (warning, timeout pending, killing, ...).
    Status { status: CommandStatus },
}

/// Complete state snapshot carried by `init` and `full_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    pub hosts: Vec<HostView>,
    pub active_commands: Vec<Command>,
    pub recent_commands: Vec<Command>,
    pub active_pipelines: Vec<Pipeline>,
    pub recent_pipelines: Vec<Pipeline>,
    pub events: Vec<LogEntry>,
    pub dashboard_version: String,
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
