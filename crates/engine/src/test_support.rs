// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine test harness: in-memory store, fake clock, recording transport.

use crate::compartments::Evaluator;
use crate::lifecycle::{LifecycleManager, UnconfiguredMergeBackend};
use crate::pipeline::PipelineExecutor;
use crate::pipelines::PipelineRegistry;
use crate::registry::OpRegistry;
use crate::scheduler::Scheduler;
use crate::transport::{AgentTransport, TransportError};
use async_trait::async_trait;
use fleet_core::{test_support, Clock, Event, FakeClock, HostId};
use fleet_storage::{EventBus, MaterializedState, Wal};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the engine asked the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Command { host: HostId, op: String },
    Kill { host: HostId, signal: String },
}

/// Transport that records sends and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    pub fail: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentTransport for RecordingTransport {
    async fn send_command(&self, host: &HostId, op: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(Sent::Command { host: host.clone(), op: op.to_string() });
        Ok(())
    }

    async fn send_kill(
        &self,
        host: &HostId,
        signal: &str,
        _pid: Option<u32>,
    ) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(Sent::Kill { host: host.clone(), signal: signal.to_string() });
        Ok(())
    }
}

/// Everything a lifecycle or pipeline test needs, wired to memory.
pub struct Harness {
    pub state: Arc<Mutex<MaterializedState>>,
    pub bus: EventBus,
    pub wal: Arc<Mutex<Wal>>,
    pub clock: FakeClock,
    pub scheduler: Arc<Mutex<Scheduler>>,
    pub transport: RecordingTransport,
    pub lifecycle: LifecycleManager<RecordingTransport, FakeClock>,
    pub pipelines: PipelineExecutor<FakeClock>,
}

pub fn harness() -> Harness {
    let (bus, reader) = EventBus::new(Wal::in_memory());
    let wal = reader.wal();
    drop(reader);

    let state = Arc::new(Mutex::new(MaterializedState::default()));
    let clock = FakeClock::new();
    let scheduler = Arc::new(Mutex::new(Scheduler::new()));
    let registry = Arc::new(OpRegistry::builtin());
    let evaluator = Arc::new(Evaluator::new(Arc::clone(&registry), "0.2.0", 60_000));
    let transport = RecordingTransport::default();

    let lifecycle = LifecycleManager::new(
        Arc::clone(&state),
        bus.clone(),
        Arc::clone(&registry),
        evaluator,
        transport.clone(),
        Arc::clone(&scheduler),
        clock.clone(),
        Arc::new(UnconfiguredMergeBackend),
    );
    let pipelines = PipelineExecutor::new(
        Arc::new(PipelineRegistry::builtin()),
        Arc::clone(&state),
        bus.clone(),
        clock.clone(),
    );

    Harness { state, bus, wal, clock, scheduler, transport, lifecycle, pipelines }
}

impl Harness {
    /// Register an online host with the standard fixture row.
    pub fn add_host(&self, id: &str) {
        self.apply(Event::HostRegistered { host: test_support::host(id) });
    }

    /// Publish a fresh remote version matching the fixture generation.
    pub fn remote_current(&self) {
        self.apply(Event::RemoteVersionFetched {
            git_commit: "commit-a".to_string(),
            lock_hash: "lock-a".to_string(),
            at_ms: self.clock.epoch_ms(),
        });
    }

    pub fn apply(&self, event: Event) {
        self.state.lock().apply_event(&event);
        let _ = self.bus.send(event);
    }

    /// Fire due timers into the lifecycle manager, like the daemon's timer
    /// loop does.
    pub fn tick(&self) {
        let fired = self.scheduler.lock().fired(self.clock.now());
        for key in fired {
            self.lifecycle.handle_timer(&key);
        }
    }

    /// Drain the WAL the way the engine loop does, feeding finished
    /// commands to the pipeline executor.
    pub async fn pump(&self) {
        loop {
            let entry = {
                let mut wal = self.wal.lock();
                match wal.next_unprocessed() {
                    Ok(Some(entry)) => entry,
                    _ => break,
                }
            };
            self.state.lock().apply_event(&entry.event);
            if let Event::CommandFinished { id, .. } = &entry.event {
                let row = self.state.lock().command(id).cloned();
                if let Some(row) = row {
                    self.pipelines.on_command_finished(&row, &self.lifecycle).await;
                }
            }
            self.wal.lock().mark_processed(entry.seq);
        }
    }
}
