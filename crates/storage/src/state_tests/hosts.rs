// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{hid, with_host};
use fleet_core::test_support;
use fleet_core::{AgentReported, Event, HostStatus};

#[test]
fn register_inserts_host() {
    let state = with_host("h-1");
    assert_eq!(state.hosts.len(), 1);
    assert!(state.host(&hid("h-1")).unwrap().is_online());
}

#[test]
fn reregister_keeps_pending_command() {
    let mut state = with_host("h-1");
    state.hosts.get_mut(&hid("h-1")).unwrap().pending_command = Some("switch".into());

    // Agent reconnects mid-switch
    state.apply_event(&Event::HostRegistered { host: test_support::host("h-1") });

    assert_eq!(
        state.host(&hid("h-1")).unwrap().pending_command.as_deref(),
        Some("switch")
    );
}

#[test]
fn heartbeat_updates_signals_but_not_pending() {
    let mut state = with_host("h-1");
    state.hosts.get_mut(&hid("h-1")).unwrap().pending_command = Some("pull".into());

    state.apply_event(&Event::HostSeen {
        id: hid("h-1"),
        at_ms: 99,
        generation: Some("commit-b".into()),
        metrics: None,
        lock_status: Some(AgentReported::Outdated),
        system_status: None,
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });

    let host = state.host(&hid("h-1")).unwrap();
    assert_eq!(host.last_seen_ms, 99);
    assert_eq!(host.generation.as_deref(), Some("commit-b"));
    assert_eq!(host.lock_status, AgentReported::Outdated);
    // Heartbeats are informational: pending_command untouched
    assert_eq!(host.pending_command.as_deref(), Some("pull"));
}

#[test]
fn heartbeat_for_unknown_host_is_ignored() {
    let mut state = with_host("h-1");
    state.apply_event(&Event::HostSeen {
        id: hid("ghost"),
        at_ms: 1,
        generation: None,
        metrics: None,
        lock_status: None,
        system_status: None,
        tests_status: None,
        tests_generation: None,
        freshness: None,
    });
    assert_eq!(state.hosts.len(), 1);
}

#[test]
fn offline_and_removed() {
    let mut state = with_host("h-1");
    state.apply_event(&Event::HostOffline { id: hid("h-1"), at_ms: 5 });
    assert_eq!(state.host(&hid("h-1")).unwrap().status, HostStatus::Offline);

    state.apply_event(&Event::HostRemoved { id: hid("h-1") });
    assert!(state.host(&hid("h-1")).is_none());
}

#[test]
fn color_set() {
    let mut state = with_host("h-1");
    state.apply_event(&Event::HostColorSet { id: hid("h-1"), color: "#112233".into() });
    assert_eq!(state.host(&hid("h-1")).unwrap().theme_color.as_deref(), Some("#112233"));
}

#[test]
fn pending_cleared() {
    let mut state = with_host("h-1");
    state.hosts.get_mut(&hid("h-1")).unwrap().pending_command = Some("pull".into());
    state.apply_event(&Event::PendingCleared { id: hid("h-1") });
    assert!(state.host(&hid("h-1")).unwrap().pending_command.is_none());
}

#[test]
fn handlers_are_idempotent() {
    let mut state = with_host("h-1");
    let event = Event::HostOffline { id: hid("h-1"), at_ms: 5 };
    state.apply_event(&event);
    let once = state.clone();
    state.apply_event(&event);
    assert_eq!(state.hosts, once.hosts);
}
