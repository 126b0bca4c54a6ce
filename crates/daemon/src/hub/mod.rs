// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Hub: in-memory registry of connected agents and browsers.
//!
//! A single actor loop owns both connection maps; register, unregister, and
//! every send are commands to that loop, so membership changes are
//! serialized and no lock is ever held across I/O. Outbound queues are
//! bounded; a client that cannot keep up is dropped and must reconnect.

pub mod agent;
pub mod browser;

use crate::sync::{Broadcaster, StateView};
use fleet_core::{new_id, Event, HostId, LogEntry, LogLevel};
use fleet_engine::{AgentTransport, TransportError};
use fleet_storage::EventBus;
use fleet_wire::{Change, ServerToAgent, SyncBody, SyncMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-client outbound queue depth.
pub const CLIENT_QUEUE: usize = 128;

pub enum HubCmd {
    RegisterAgent {
        host_id: HostId,
        conn_id: u64,
        tx: mpsc::Sender<ServerToAgent>,
    },
    UnregisterAgent {
        host_id: HostId,
        conn_id: u64,
    },
    RegisterBrowser {
        conn_id: u64,
        tx: mpsc::Sender<SyncMessage>,
    },
    UnregisterBrowser {
        conn_id: u64,
    },
    ToAgent {
        host_id: HostId,
        msg: ServerToAgent,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Broadcast {
        changes: Vec<Change>,
    },
    SendFullState {
        conn_id: u64,
    },
    Beacon,
}

struct AgentConn {
    conn_id: u64,
    tx: mpsc::Sender<ServerToAgent>,
}

struct BrowserConn {
    tx: mpsc::Sender<SyncMessage>,
}

/// Cheap handle cloned into every connection task and component.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCmd>,
}

impl HubHandle {
    pub async fn send(&self, cmd: HubCmd) {
        if self.tx.send(cmd).await.is_err() {
            warn!("hub loop is gone, dropping command");
        }
    }
}

/// Agent transport facade backed by the hub loop.
#[derive(Clone)]
pub struct HubTransport {
    handle: HubHandle,
}

#[async_trait::async_trait]
impl AgentTransport for HubTransport {
    async fn send_command(&self, host: &HostId, op: &str) -> Result<(), TransportError> {
        self.request(host, ServerToAgent::Command { command: op.to_string() }).await
    }

    async fn send_kill(
        &self,
        host: &HostId,
        signal: &str,
        pid: Option<u32>,
    ) -> Result<(), TransportError> {
        self.request(host, ServerToAgent::KillCommand { signal: signal.to_string(), pid }).await
    }
}

impl HubTransport {
    async fn request(&self, host: &HostId, msg: ServerToAgent) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.handle
            .send(HubCmd::ToAgent { host_id: host.clone(), msg, reply: reply_tx })
            .await;
        reply_rx.await.unwrap_or(Err(TransportError::PeerGone("hub loop gone".to_string())))
    }
}

pub struct Hub {
    rx: mpsc::Receiver<HubCmd>,
    agents: HashMap<HostId, AgentConn>,
    browsers: HashMap<u64, BrowserConn>,
    version: u64,
    view: Arc<StateView>,
    bus: EventBus,
}

impl Hub {
    /// Build the hub actor plus its handle and transport facade.
    pub fn new(view: Arc<StateView>, bus: EventBus) -> (Self, HubHandle, HubTransport) {
        let (tx, rx) = mpsc::channel(1024);
        let handle = HubHandle { tx };
        let transport = HubTransport { handle: handle.clone() };
        let hub = Hub {
            rx,
            agents: HashMap::new(),
            browsers: HashMap::new(),
            version: 0,
            view,
            bus,
        };
        (hub, handle, transport)
    }

    /// The actor loop. Command handling never awaits: sends use bounded
    /// try_send and overflow disconnects the client instead of blocking.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("hub loop stopped");
    }

    fn handle(&mut self, cmd: HubCmd) {
        match cmd {
            HubCmd::RegisterAgent { host_id, conn_id, tx } => {
                if let Some(old) = self.agents.insert(host_id.clone(), AgentConn { conn_id, tx }) {
                    // Replacing a live connection closes the old writer.
                    debug!(%host_id, old_conn = old.conn_id, "agent connection replaced");
                }
                info!(%host_id, conn_id, "agent registered with hub");
            }
            HubCmd::UnregisterAgent { host_id, conn_id } => {
                // Only the owning connection may unregister; a replaced
                // connection's teardown must not evict its successor.
                if self.agents.get(&host_id).map(|a| a.conn_id) == Some(conn_id) {
                    self.agents.remove(&host_id);
                    info!(%host_id, conn_id, "agent unregistered from hub");
                }
            }
            HubCmd::RegisterBrowser { conn_id, tx } => {
                // The init frame is versioned inside the loop, atomically
                // with delta assignment: no browser can observe a gap
                // between its init and the next delta.
                let full_state = self.view.full_state();
                let init = SyncMessage::new(self.version, SyncBody::Init(full_state));
                if tx.try_send(init).is_err() {
                    warn!(conn_id, "browser queue full on init, dropping connection");
                    return;
                }
                self.browsers.insert(conn_id, BrowserConn { tx });
                info!(conn_id, browsers = self.browsers.len(), "browser connected");
            }
            HubCmd::UnregisterBrowser { conn_id } => {
                if self.browsers.remove(&conn_id).is_some() {
                    info!(conn_id, browsers = self.browsers.len(), "browser disconnected");
                }
            }
            HubCmd::ToAgent { host_id, msg, reply } => {
                let result = match self.agents.get(&host_id) {
                    None => Err(TransportError::NotConnected),
                    Some(agent) => match agent.tx.try_send(msg) {
                        Ok(()) => Ok(()),
                        Err(_) => {
                            // Safe-send guard: overflow drops the agent
                            // connection rather than blocking the loop.
                            warn!(%host_id, "agent queue overflow, dropping connection");
                            self.agents.remove(&host_id);
                            self.audit_overflow(&host_id);
                            Err(TransportError::QueueFull)
                        }
                    },
                };
                let _ = reply.send(result);
            }
            HubCmd::Broadcast { changes } => {
                for change in changes {
                    self.version += 1;
                    let msg = SyncMessage::new(self.version, SyncBody::Delta(change));
                    self.fan_out(msg);
                }
            }
            HubCmd::SendFullState { conn_id } => {
                let Some(browser) = self.browsers.get(&conn_id) else { return };
                let msg =
                    SyncMessage::new(self.version, SyncBody::FullState(self.view.full_state()));
                if browser.tx.try_send(msg).is_err() {
                    warn!(conn_id, "browser queue full on full_state, dropping");
                    self.browsers.remove(&conn_id);
                }
            }
            HubCmd::Beacon => {
                let msg = SyncMessage::new(self.version, SyncBody::Sync);
                self.fan_out(msg);
            }
        }
    }

    /// Deliver to every browser; overflowing browsers are dropped and will
    /// resync on reconnect.
    fn fan_out(&mut self, msg: SyncMessage) {
        let mut dead: Vec<u64> = Vec::new();
        for (conn_id, browser) in &self.browsers {
            if browser.tx.try_send(msg.clone()).is_err() {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            warn!(conn_id, "browser queue overflow, dropping connection");
            self.browsers.remove(&conn_id);
        }
    }

    fn audit_overflow(&self, host_id: &HostId) {
        let event = Event::Logged {
            entry: LogEntry {
                id: new_id(),
                at_ms: self.view.clock_ms(),
                category: "transport".to_string(),
                level: LogLevel::Warn,
                actor: "system".to_string(),
                host_id: Some(host_id.clone()),
                action: None,
                message: "agent outbound queue overflowed, connection dropped".to_string(),
                details: None,
            },
        };
        self.view.state.lock().apply_event(&event);
        if let Err(e) = self.bus.send(event) {
            warn!(error = %e, "failed to persist overflow audit entry");
        }
    }
}

/// Spawn the broadcast forwarder: drains the bounded queue into the hub
/// loop, scheduling a beacon after overflow.
pub fn spawn_broadcast_forwarder(
    broadcaster: Broadcaster,
    handle: HubHandle,
    shutdown: CancellationToken,
) {
    crate::supervise::spawn_supervised("broadcast", shutdown.clone(), move || {
        let broadcaster = broadcaster.clone();
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            loop {
                tokio::select! {
                    (changes, beacon) = broadcaster.drain() => {
                        if !changes.is_empty() {
                            handle.send(HubCmd::Broadcast { changes }).await;
                        }
                        if beacon {
                            handle.send(HubCmd::Beacon).await;
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
