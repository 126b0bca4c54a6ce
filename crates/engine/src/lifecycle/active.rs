// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory bookkeeping for the command in flight on a host.

use fleet_core::{Command, CommandId, Freshness, Host};

/// The live half of a command. The durable row lives in the store; this
/// entry exists only while the command is non-terminal and is rebuilt from
/// the store on restart.
#[derive(Debug, Clone)]
pub struct ActiveCommand {
    pub command: Command,
    /// Host row captured at dispatch, for post-check comparisons.
    pub pre_snapshot: Host,
    /// Freshness captured at dispatch for switch variants.
    pub pre_freshness: Option<Freshness>,
    pub warning_at_ms: Option<u64>,
    /// Minutes added through extend-timeout.
    pub timeout_extended_mins: u64,
    pub kill_initiated_at_ms: Option<u64>,
    pub kill_signal: Option<String>,
    pub reconnect_deadline_ms: Option<u64>,
    /// Exit 0 received; post-check runs on the next heartbeat.
    pub post_check_deferred: bool,
    pub deferred_exit_code: Option<i32>,
    /// When the agent reported completion (for the heartbeat-ordering rule).
    pub completed_at_ms: Option<u64>,
}

impl ActiveCommand {
    pub fn new(command: Command, pre_snapshot: Host, pre_freshness: Option<Freshness>) -> Self {
        Self {
            command,
            pre_snapshot,
            pre_freshness,
            warning_at_ms: None,
            timeout_extended_mins: 0,
            kill_initiated_at_ms: None,
            kill_signal: None,
            reconnect_deadline_ms: None,
            post_check_deferred: false,
            deferred_exit_code: None,
            completed_at_ms: None,
        }
    }

    pub fn id(&self) -> &CommandId {
        &self.command.id
    }
}

/// Timer key builders. One watcher set per command, keyed by command id.
pub fn warn_key(id: &CommandId) -> String {
    format!("warn:{id}")
}

pub fn hard_key(id: &CommandId) -> String {
    format!("hard:{id}")
}

pub fn reconnect_key(id: &CommandId) -> String {
    format!("reconnect:{id}")
}

/// Parse a fired timer key back into its kind and command id.
pub fn parse_key(key: &str) -> Option<(TimerKind, CommandId)> {
    let (kind, id) = key.split_once(':')?;
    let kind = match kind {
        "warn" => TimerKind::Warning,
        "hard" => TimerKind::Hard,
        "reconnect" => TimerKind::Reconnect,
        _ => return None,
    };
    Some((kind, CommandId::new(id)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Warning,
    Hard,
    Reconnect,
}
