// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon context handed to HTTP handlers and connection tasks.

use crate::env::Config;
use crate::hub::{HubHandle, HubTransport};
use crate::output::OutputStore;
use crate::session::SessionStore;
use crate::sync::{Broadcaster, StateView};
use fleet_core::{Event, SystemClock};
use fleet_engine::{LifecycleManager, PipelineExecutor};
use fleet_storage::{EventBus, MaterializedState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Concrete engine types as wired in this daemon.
pub type Lifecycle = LifecycleManager<HubTransport, SystemClock>;
pub type Pipelines = PipelineExecutor<SystemClock>;

pub struct App {
    pub config: Config,
    pub state: Arc<Mutex<MaterializedState>>,
    pub bus: EventBus,
    pub view: Arc<StateView>,
    pub lifecycle: Arc<Lifecycle>,
    pub pipelines: Arc<Pipelines>,
    pub hub: HubHandle,
    pub broadcaster: Broadcaster,
    pub sessions: SessionStore,
    pub output: OutputStore,
    conn_ids: AtomicU64,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        state: Arc<Mutex<MaterializedState>>,
        bus: EventBus,
        view: Arc<StateView>,
        lifecycle: Arc<Lifecycle>,
        pipelines: Arc<Pipelines>,
        hub: HubHandle,
        broadcaster: Broadcaster,
    ) -> Self {
        let output = OutputStore::new(config.output_dir());
        Self {
            config,
            state,
            bus,
            view,
            lifecycle,
            pipelines,
            hub,
            broadcaster,
            sessions: SessionStore::new(),
            output,
            conn_ids: AtomicU64::new(1),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        self.conn_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Apply-then-append, the same read-your-writes discipline the engine
    /// components use.
    pub fn record(&self, event: Event) {
        self.state.lock().apply_event(&event);
        if let Err(e) = self.bus.send(event) {
            warn!(error = %e, "failed to persist event");
        }
    }
}
