// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scenario fixtures.

pub use fleet_core::{
    AgentReported, Clock, CommandStatus, Event, Freshness, HostId, PipelineStatus,
};
pub use fleet_engine::test_support::{harness, Harness, Sent};

pub fn hid(id: &str) -> HostId {
    HostId::new(id)
}

pub fn no_args() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

/// Heartbeat with the given generation and lock/system report.
pub fn heartbeat(
    h: &Harness,
    host: &str,
    generation: &str,
    lock: AgentReported,
    system: AgentReported,
) {
    h.apply(Event::HostSeen {
        id: hid(host),
        at_ms: h.clock.epoch_ms(),
        generation: Some(generation.to_string()),
        metrics: None,
        lock_status: Some(lock),
        system_status: Some(system),
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
    h.lifecycle.handle_heartbeat(&hid(host));
}

/// Put a host behind the published remote commit.
pub fn behind_remote(h: &Harness, host: &str) {
    h.apply(Event::HostSeen {
        id: hid(host),
        at_ms: h.clock.epoch_ms(),
        generation: Some("commit-old".to_string()),
        metrics: None,
        lock_status: Some(AgentReported::Outdated),
        system_status: Some(AgentReported::Outdated),
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
}

/// Latest command row for a host.
pub fn last_command(h: &Harness, host: &str) -> fleet_core::Command {
    let state = h.state.lock();
    state
        .commands
        .values()
        .filter(|c| c.host_id.as_str() == host)
        .max_by_key(|c| (c.created_at_ms, c.id.clone()))
        .cloned()
        .expect("no command for host")
}

pub fn pending(h: &Harness, host: &str) -> Option<String> {
    h.state.lock().host(&hid(host)).and_then(|r| r.pending_command.clone())
}
