// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixtures shared by unit tests across the workspace.

use crate::command::{Command, CommandId, CommandStatus};
use crate::host::{AgentReported, Host, HostId, HostStatus, HostType};

/// An online NixOS host with sane defaults.
pub fn host(id: &str) -> Host {
    Host {
        id: HostId::new(id),
        hostname: format!("{id}.fleet.local"),
        host_type: HostType::Nixos,
        status: HostStatus::Online,
        last_seen_ms: 1_700_000_000_000,
        generation: Some("commit-a".to_string()),
        agent_version: Some("0.2.0".to_string()),
        os_version: Some("24.11".to_string()),
        theme_color: None,
        location: None,
        device_type: None,
        metrics: None,
        pending_command: None,
        lock_status: AgentReported::Ok,
        system_status: AgentReported::Ok,
        tests_status: AgentReported::Unknown,
        tests_generation: None,
        repo_url: None,
        repo_dir: None,
        heartbeat_interval_secs: 30,
        freshness: None,
    }
}

/// A command row in the given state.
pub fn command(id: &str, host: &str, op: &str, status: CommandStatus) -> Command {
    Command {
        id: CommandId::new(id),
        host_id: HostId::new(host),
        op_id: op.to_string(),
        pipeline_id: None,
        status,
        created_at_ms: 1_700_000_000_000,
        started_at_ms: None,
        finished_at_ms: None,
        exit_code: None,
        error: None,
        output_file: None,
    }
}
