// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host rows and the signals agents report about themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a fleet host.
///
/// Assigned on first registration and reused for every later connection of
/// the same hostname, so command history survives agent restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Operating system flavor of a managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    Nixos,
    Macos,
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nixos => write!(f, "nixos"),
            Self::Macos => write!(f, "macos"),
        }
    }
}

/// Connection liveness of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

/// Point-in-time resource metrics carried on heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub mem_percent: f64,
    #[serde(default)]
    pub disk_percent: f64,
    #[serde(default)]
    pub load1: f64,
    #[serde(default)]
    pub uptime_secs: u64,
}

/// Status an agent reports for one of its own compartment inputs.
///
/// This is the raw signal; the evaluator derives the browser-facing
/// compartment from it together with the remote desired state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentReported {
    Ok,
    Outdated,
    Error,
    #[default]
    Unknown,
}

/// The three independent signals used to verify that a switch actually
/// replaced the running agent binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_hash: Option<String>,
}

impl Freshness {
    pub fn is_empty(&self) -> bool {
        self.source_commit.is_none() && self.store_path.is_none() && self.binary_hash.is_none()
    }
}

/// A managed host as persisted in the store.
///
/// `pending_command` is owned by the Lifecycle Manager: the only events that
/// mutate it are `CommandStarted` and `CommandFinished` (plus the stale
/// reconciliation `PendingCleared`). Heartbeats are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub hostname: String,
    pub host_type: HostType,
    pub status: HostStatus,
    #[serde(default)]
    pub last_seen_ms: u64,
    /// Source commit the host is currently deployed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HostMetrics>,
    /// Op id of the in-flight command, if any. Lifecycle Manager only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_command: Option<String>,
    #[serde(default)]
    pub lock_status: AgentReported,
    #[serde(default)]
    pub system_status: AgentReported,
    #[serde(default)]
    pub tests_status: AgentReported,
    /// Generation the last test run executed against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Host {
    pub fn is_online(&self) -> bool {
        self.status == HostStatus::Online
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
