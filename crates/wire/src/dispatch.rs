// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch: the single mutation entry point for browsers.

use fleet_core::{CommandId, HostId, PipelineId};
use serde::{Deserialize, Serialize};

/// Body of `POST /dispatch`.
///
/// `op` names either a registry op or a pipeline. `args` carries op-specific
/// parameters (e.g. the color for `set-color`, minutes for
/// `extend-timeout`); unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub op: String,
    pub hosts: Vec<HostId>,
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Successful dispatch reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchResponse {
    Pipeline { pipeline_id: PipelineId },
    Commands { command_ids: Vec<CommandId> },
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
