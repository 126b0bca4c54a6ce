// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Op identifiers and the executor split.
//!
//! The op *definitions* (validators, timeouts, post-checks) live in
//! fleet-engine's registry; this module only fixes the id vocabulary so the
//! wire, storage, and engine crates agree on spellings.

use serde::{Deserialize, Serialize};

/// Where an op runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpExecutor {
    /// Sent to the host's agent over the agent transport.
    Agent,
    /// Executed by the dashboard process itself.
    Dashboard,
}

/// Well-known op ids.
pub mod ops {
    pub const PULL: &str = "pull";
    pub const SWITCH: &str = "switch";
    pub const PULL_SWITCH: &str = "pull-switch";
    pub const TEST: &str = "test";
    pub const RESTART: &str = "restart";
    pub const STOP: &str = "stop";
    pub const KILL: &str = "kill";
    pub const REBOOT: &str = "reboot";
    pub const REFRESH_GIT: &str = "refresh-git";
    pub const REFRESH_LOCK: &str = "refresh-lock";
    pub const REFRESH_SYSTEM: &str = "refresh-system";
    pub const CHECK_VERSION: &str = "check-version";
    pub const BUMP_FLAKE: &str = "bump-flake";
    pub const FORCE_REBUILD: &str = "force-rebuild";
    pub const MERGE_PR: &str = "merge-pr";
    pub const SET_COLOR: &str = "set-color";
    pub const REMOVE: &str = "remove";

    /// Timeout-resolution pseudo-ops. Routed straight to the Lifecycle
    /// Manager; they never appear in the registry.
    pub const EXTEND_TIMEOUT: &str = "extend-timeout";
    pub const CANCEL: &str = "cancel";

    /// True for the switch variants that replace the running agent binary
    /// and therefore verify via reconnect instead of at exit.
    pub fn replaces_agent(op: &str) -> bool {
        matches!(op, SWITCH | PULL_SWITCH)
    }
}
