// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent channel messages.
//!
//! The agent protocol is fixed: envelope `{type, payload}`, snake_case type
//! names. Fields the dashboard does not understand are ignored, and agents
//! older than the dashboard may omit optional fields, so every payload field
//! beyond the required core is `Option` + `serde(default)`.

use fleet_core::{AgentReported, HostId, HostMetrics, HostType};
use serde::{Deserialize, Serialize};

/// Messages the agent sends to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AgentToServer {
    Register(RegisterPayload),
    Heartbeat(HeartbeatPayload),
    Output(OutputPayload),
    Status(StatusPayload),
    CommandComplete(CommandCompletePayload),
    CommandRejected(CommandRejectedPayload),
    TestProgress(TestProgressPayload),
    OperationProgress(OperationProgressPayload),
}

/// Messages the dashboard sends to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerToAgent {
    Registered { host_id: HostId },
    Command { command: String },
    KillCommand { signal: String, pid: Option<u32> },
}

/// Sent once after connecting; rotates the host row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub hostname: String,
    pub host_type: HostType,
    pub agent_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_hash: Option<String>,
}

/// Agent-reported lock/system pair carried on heartbeats and completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatusPayload {
    pub lock: AgentReported,
    pub system: AgentReported,
}

/// Periodic liveness and signal report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HostMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_status: Option<UpdateStatusPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_status: Option<AgentReported>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of command output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPayload {
    /// Op id of the running command.
    pub command: String,
    pub line: String,
    pub stream: OutputStream,
}

/// Intermediate status report for a running command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub command: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Final exit report for a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCompletePayload {
    pub command: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fresh_status: Option<UpdateStatusPayload>,
}

/// The agent refused a command (already busy with another one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRejectedPayload {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_pid: Option<u32>,
}

/// Progress during a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestProgressPayload {
    pub current: u32,
    pub total: u32,
    pub passed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Progress during a long-running operation (e.g. a rebuild).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationProgressPayload {
    pub phase: String,
    pub current: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
