// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline rows: ordered op sequences with short-circuit drop-off.

use crate::host::HostId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier for a pipeline run (uuid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PipelineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Terminal and running states of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStatus {
    Running,
    Complete,
    Partial,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// An ordered multi-op run across a host set.
///
/// `current_stage` only ever increases. Hosts that fail a stage are recorded
/// in `dropped` with the stage index at which they fell off; they are skipped
/// for all later stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    /// Registry name this run was created from (e.g. "deploy").
    pub name: String,
    /// The op sequence, resolved at dispatch time.
    pub ops: Vec<String>,
    /// The full host set the pipeline was dispatched to.
    pub hosts: Vec<HostId>,
    pub current_stage: usize,
    pub status: PipelineStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Host → stage index at which it dropped off.
    #[serde(default)]
    pub dropped: HashMap<HostId, usize>,
}

impl Pipeline {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Hosts still active (not dropped).
    pub fn active_hosts(&self) -> impl Iterator<Item = &HostId> {
        self.hosts.iter().filter(|h| !self.dropped.contains_key(h))
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
