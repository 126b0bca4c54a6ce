// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod complete;
mod dispatch;
mod reconnect;
mod timeout;

use crate::test_support::{harness, Harness};
use fleet_core::{CommandStatus, HostId};

pub(crate) fn hid(id: &str) -> HostId {
    HostId::new(id)
}

pub(crate) fn no_args() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

/// Harness with one online host and a current remote version.
pub(crate) fn ready() -> Harness {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    h
}

/// Status of the single command row for a host, if any.
pub(crate) fn command_status(h: &Harness, host: &str) -> Option<CommandStatus> {
    let state = h.state.lock();
    state
        .commands
        .values()
        .filter(|c| c.host_id.as_str() == host)
        .max_by_key(|c| c.created_at_ms)
        .map(|c| c.status)
}

pub(crate) fn pending(h: &Harness, host: &str) -> Option<String> {
    h.state.lock().host(&hid(host)).and_then(|r| r.pending_command.clone())
}
