// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fully wired daemon context over an in-memory store, for unit tests.

use crate::app::App;
use crate::env::Config;
use crate::hub::Hub;
use crate::sync::{Broadcaster, StateView};
use fleet_core::{new_id, Event, SystemClock};
use fleet_engine::lifecycle::UnconfiguredMergeBackend;
use fleet_engine::{
    Evaluator, LifecycleManager, OpRegistry, PipelineExecutor, PipelineRegistry, Scheduler,
};
use fleet_storage::{EventBus, MaterializedState, Wal};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) fn test_config() -> Config {
    let dir = std::env::temp_dir().join(format!("fleetd-test-{}", new_id()));
    Config {
        state_dir: dir.clone(),
        log_dir: dir.join("logs"),
        listen_addr: "127.0.0.1:0".to_string(),
        agent_token: Some("agent-token".to_string()),
        session_secret: Some("hunter2".to_string()),
        remote_version_url: None,
        totp_secret: None,
        remote_fetch_interval: Duration::from_secs(30),
        remote_ttl: Duration::from_secs(120),
        stale_check_interval: Duration::from_secs(30),
        sync_beacon_interval: Duration::from_secs(30),
    }
}

/// Build an [`App`] over an in-memory WAL with the hub loop running.
pub(crate) fn test_app() -> Arc<App> {
    let config = test_config();
    let (bus, reader) = EventBus::new(Wal::in_memory());
    drop(reader);

    let state = Arc::new(Mutex::new(MaterializedState::default()));
    let clock = SystemClock;
    let registry = Arc::new(OpRegistry::builtin());
    let evaluator = Arc::new(Evaluator::new(Arc::clone(&registry), "0.2.0", 120_000));
    let scheduler = Arc::new(Mutex::new(Scheduler::new()));
    let view = Arc::new(StateView {
        state: Arc::clone(&state),
        evaluator: Arc::clone(&evaluator),
        registry: Arc::clone(&registry),
        clock,
        dashboard_version: "0.2.0".to_string(),
    });

    let (hub, hub_handle, hub_transport) = Hub::new(Arc::clone(&view), bus.clone());
    tokio::spawn(hub.run(CancellationToken::new()));

    let lifecycle = Arc::new(LifecycleManager::new(
        Arc::clone(&state),
        bus.clone(),
        Arc::clone(&registry),
        evaluator,
        hub_transport,
        scheduler,
        clock,
        Arc::new(UnconfiguredMergeBackend),
    ));
    let pipelines = Arc::new(PipelineExecutor::new(
        Arc::new(PipelineRegistry::builtin()),
        Arc::clone(&state),
        bus.clone(),
        clock,
    ));

    Arc::new(App::new(
        config,
        state,
        bus,
        view,
        lifecycle,
        pipelines,
        hub_handle,
        Broadcaster::new(),
    ))
}

/// Register a standard online host row.
pub(crate) fn add_host(app: &App, id: &str) {
    app.record(Event::HostRegistered { host: fleet_core::test_support::host(id) });
}
