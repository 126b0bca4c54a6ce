// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sync::StateView;
use fleet_core::{test_support, Event, SystemClock};
use fleet_engine::{Evaluator, OpRegistry};
use fleet_storage::{EventBus, MaterializedState, Wal};
use fleet_wire::SyncBody;
use parking_lot::Mutex;

fn test_hub() -> (HubHandle, HubTransport) {
    let state = Arc::new(Mutex::new(MaterializedState::default()));
    state.lock().apply_event(&Event::HostRegistered { host: test_support::host("h-1") });
    let registry = Arc::new(OpRegistry::builtin());
    let evaluator = Arc::new(Evaluator::new(Arc::clone(&registry), "0.2.0", 120_000));
    let view = Arc::new(StateView {
        state,
        evaluator,
        registry,
        clock: SystemClock,
        dashboard_version: "0.2.0".to_string(),
    });
    let (bus, _reader) = EventBus::new(Wal::in_memory());
    let (hub, handle, transport) = Hub::new(view, bus);
    tokio::spawn(hub.run(CancellationToken::new()));
    (handle, transport)
}

#[tokio::test]
async fn browser_gets_versioned_init_then_contiguous_deltas() {
    let (handle, _) = test_hub();

    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
    handle.send(HubCmd::RegisterBrowser { conn_id: 1, tx }).await;

    let init = rx.recv().await.unwrap();
    assert!(matches!(init.body, SyncBody::Init(_)));
    let base = init.version;

    handle
        .send(HubCmd::Broadcast {
            changes: vec![
                fleet_wire::Change::HostRemoved { id: "x".into() },
                fleet_wire::Change::HostRemoved { id: "y".into() },
            ],
        })
        .await;

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.version, base + 1);
    assert_eq!(second.version, base + 2);
    assert!(matches!(first.body, SyncBody::Delta(_)));
}

#[tokio::test]
async fn beacon_carries_the_current_version() {
    let (handle, _) = test_hub();
    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
    handle.send(HubCmd::RegisterBrowser { conn_id: 1, tx }).await;
    let init = rx.recv().await.unwrap();

    handle
        .send(HubCmd::Broadcast {
            changes: vec![fleet_wire::Change::HostRemoved { id: "x".into() }],
        })
        .await;
    handle.send(HubCmd::Beacon).await;

    let _delta = rx.recv().await.unwrap();
    let beacon = rx.recv().await.unwrap();
    assert!(matches!(beacon.body, SyncBody::Sync));
    assert_eq!(beacon.version, init.version + 1);
}

#[tokio::test]
async fn get_state_reply_matches_init_shape() {
    let (handle, _) = test_hub();
    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
    handle.send(HubCmd::RegisterBrowser { conn_id: 1, tx }).await;
    let _init = rx.recv().await.unwrap();

    handle.send(HubCmd::SendFullState { conn_id: 1 }).await;
    let full = rx.recv().await.unwrap();
    let SyncBody::FullState(state) = full.body else { panic!("expected full_state") };
    assert_eq!(state.hosts.len(), 1);
}

#[tokio::test]
async fn send_to_unconnected_agent_is_not_connected() {
    let (_, transport) = test_hub();
    let err = transport.send_command(&"h-1".into(), "pull").await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn send_to_connected_agent_delivers() {
    let (handle, transport) = test_hub();
    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE);
    handle.send(HubCmd::RegisterAgent { host_id: "h-1".into(), conn_id: 1, tx }).await;

    transport.send_command(&"h-1".into(), "pull").await.unwrap();
    let msg = rx.recv().await.unwrap();
    assert_eq!(msg, ServerToAgent::Command { command: "pull".into() });

    transport.send_kill(&"h-1".into(), "SIGKILL", Some(9)).await.unwrap();
    let msg = rx.recv().await.unwrap();
    assert_eq!(msg, ServerToAgent::KillCommand { signal: "SIGKILL".into(), pid: Some(9) });
}

#[tokio::test]
async fn overflowing_agent_queue_disconnects_it() {
    let (handle, transport) = test_hub();
    // Tiny queue that is never drained
    let (tx, _rx) = mpsc::channel(1);
    handle.send(HubCmd::RegisterAgent { host_id: "h-1".into(), conn_id: 1, tx }).await;

    transport.send_command(&"h-1".into(), "pull").await.unwrap();
    let err = transport.send_command(&"h-1".into(), "pull").await.unwrap_err();
    assert!(matches!(err, TransportError::QueueFull));

    // The connection was dropped; further sends see not-connected
    let err = transport.send_command(&"h-1".into(), "pull").await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn stale_unregister_does_not_evict_successor() {
    let (handle, transport) = test_hub();
    let (tx1, _rx1) = mpsc::channel(CLIENT_QUEUE);
    let (tx2, mut rx2) = mpsc::channel(CLIENT_QUEUE);
    handle.send(HubCmd::RegisterAgent { host_id: "h-1".into(), conn_id: 1, tx: tx1 }).await;
    handle.send(HubCmd::RegisterAgent { host_id: "h-1".into(), conn_id: 2, tx: tx2 }).await;

    // The old connection's teardown arrives late
    handle.send(HubCmd::UnregisterAgent { host_id: "h-1".into(), conn_id: 1 }).await;

    transport.send_command(&"h-1".into(), "pull").await.unwrap();
    assert!(rx2.recv().await.is_some());
}
