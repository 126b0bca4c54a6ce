// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{test_support, CommandStatus, CompartmentStatus, Event};
use fleet_wire::Change;

fn view_with_host() -> StateView {
    let state = Arc::new(Mutex::new(MaterializedState::default()));
    let registry = Arc::new(OpRegistry::builtin());
    let evaluator = Arc::new(Evaluator::new(Arc::clone(&registry), "0.2.0", 120_000));
    state.lock().apply_event(&Event::HostRegistered { host: test_support::host("h-1") });
    StateView {
        state,
        evaluator,
        registry,
        clock: SystemClock,
        dashboard_version: "0.2.0".to_string(),
    }
}

#[test]
fn full_state_carries_derived_host_views() {
    let view = view_with_host();
    let full = view.full_state();

    assert_eq!(full.hosts.len(), 1);
    assert_eq!(full.dashboard_version, "0.2.0");
    let host = &full.hosts[0];
    // No remote version fetched yet: system cannot be green
    assert_ne!(host.compartments.system.status, CompartmentStatus::Ok);
    assert!(!host.available_ops.is_empty());
}

#[test]
fn busy_host_view_lists_control_ops_only() {
    let view = view_with_host();
    {
        let mut state = view.state.lock();
        state.apply_event(&Event::CommandCreated {
            command: test_support::command("c-1", "h-1", "pull", CommandStatus::Validating),
        });
        state.apply_event(&Event::CommandStarted {
            id: "c-1".into(),
            host_id: "h-1".into(),
            op_id: "pull".into(),
            at_ms: 1,
        });
    }
    let full = view.full_state();
    assert_eq!(full.hosts[0].available_ops, vec!["stop".to_string(), "kill".to_string()]);
    assert_eq!(full.active_commands.len(), 1);
}

#[test]
fn host_fields_is_a_full_object() {
    let view = view_with_host();
    let row = view.state.lock().host(&"h-1".into()).cloned().unwrap();
    let fields = view.host_fields(&row);
    assert!(fields.contains_key("hostname"));
    assert!(fields.contains_key("compartments"));
    assert!(fields.contains_key("update_status"));
    assert!(fields.contains_key("available_ops"));
}

#[tokio::test]
async fn broadcaster_delivers_in_order() {
    let broadcaster = Broadcaster::new();
    broadcaster.publish(Change::HostRemoved { id: "a".into() });
    broadcaster.publish(Change::HostRemoved { id: "b".into() });

    let (changes, beacon) = broadcaster.drain().await;
    assert_eq!(changes.len(), 2);
    assert!(!beacon);
    assert!(matches!(&changes[0], Change::HostRemoved { id } if id.as_str() == "a"));
}

#[tokio::test]
async fn broadcaster_overflow_drops_oldest_and_schedules_beacon() {
    let broadcaster = Broadcaster::new();
    for n in 0..(BROADCAST_CAP + 2) {
        broadcaster.publish(Change::HostRemoved { id: format!("h-{n}").as_str().into() });
    }

    let (changes, beacon) = broadcaster.drain().await;
    assert_eq!(changes.len(), BROADCAST_CAP);
    assert!(beacon, "overflow must schedule a sync beacon");
    // The two oldest deltas were dropped
    assert!(matches!(&changes[0], Change::HostRemoved { id } if id.as_str() == "h-2"));
}
