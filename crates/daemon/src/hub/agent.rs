// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent websocket connections: bearer auth, registration, inbound routing.

use crate::app::App;
use crate::hub::{HubCmd, CLIENT_QUEUE};
use axum::extract::ws::{Message, WebSocket};
use fleet_core::{new_id, AgentReported, Event, Freshness, Host, HostId, HostStatus};
use fleet_wire::{AgentToServer, Change, Progress, RegisterPayload, ServerToAgent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a fresh connection may sit silent before its first register.
const REGISTER_DEADLINE: Duration = Duration::from_secs(10);

/// Drive one agent connection to completion.
pub async fn run(app: Arc<App>, socket: WebSocket) {
    let conn_id = app.next_conn_id();
    let (mut sink, mut stream) = socket.split();

    // Bounded writer queue; the hub only ever try_sends into it.
    let (tx, mut rx) = mpsc::channel::<ServerToAgent>(CLIENT_QUEUE);
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match fleet_wire::encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "failed to encode agent frame");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // The first message must be a register.
    let host_id = match wait_for_register(&app, &mut stream, &tx).await {
        Some(host_id) => host_id,
        None => {
            writer.abort();
            return;
        }
    };

    app.hub.send(HubCmd::RegisterAgent { host_id: host_id.clone(), conn_id, tx }).await;
    // A re-register after a switch verifies binary freshness.
    app.lifecycle.handle_agent_reconnect(&host_id);

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match fleet_wire::decode::<AgentToServer>(&text) {
            Ok(msg) => route(&app, &host_id, msg).await,
            Err(e) => debug!(%host_id, error = %e, "undecodable agent frame"),
        }
    }

    app.hub.send(HubCmd::UnregisterAgent { host_id: host_id.clone(), conn_id }).await;
    app.record(Event::HostOffline { id: host_id.clone(), at_ms: app.view.clock_ms() });
    info!(%host_id, "agent disconnected");
    writer.abort();
}

async fn wait_for_register(
    app: &Arc<App>,
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    tx: &mpsc::Sender<ServerToAgent>,
) -> Option<HostId> {
    let first = tokio::time::timeout(REGISTER_DEADLINE, stream.next()).await.ok()??;
    let text = match first {
        Ok(Message::Text(text)) => text,
        _ => return None,
    };
    let msg = match fleet_wire::decode::<AgentToServer>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "agent sent garbage before registering");
            return None;
        }
    };
    let payload = match msg {
        AgentToServer::Register(payload) => payload,
        other => {
            warn!("agent sent {other:?} before registering");
            return None;
        }
    };

    let host = rotate_host_row(app, payload);
    let host_id = host.id.clone();
    app.record(Event::HostRegistered { host });
    if tx.send(ServerToAgent::Registered { host_id: host_id.clone() }).await.is_err() {
        return None;
    }
    info!(%host_id, "agent registered");
    Some(host_id)
}

/// Build the new host row from the register payload, reusing the stable id
/// and sticky fields of any existing row with the same hostname.
fn rotate_host_row(app: &Arc<App>, payload: RegisterPayload) -> Host {
    let existing: Option<Host> = {
        let state = app.view.state.lock();
        state.hosts.values().find(|h| h.hostname == payload.hostname).cloned()
    };

    let now_ms = app.view.clock_ms();
    let freshness = Freshness {
        source_commit: payload.source_commit,
        store_path: payload.store_path,
        binary_hash: payload.binary_hash,
    };

    let base = existing.unwrap_or(Host {
        id: HostId::new(new_id()),
        hostname: payload.hostname.clone(),
        host_type: payload.host_type,
        status: HostStatus::Online,
        last_seen_ms: now_ms,
        generation: None,
        agent_version: None,
        os_version: None,
        theme_color: None,
        location: None,
        device_type: None,
        metrics: None,
        pending_command: None,
        lock_status: AgentReported::Unknown,
        system_status: AgentReported::Unknown,
        tests_status: AgentReported::Unknown,
        tests_generation: None,
        repo_url: None,
        repo_dir: None,
        heartbeat_interval_secs: 30,
        freshness: None,
    });

    let mut row = base;
    row.hostname = payload.hostname;
    row.host_type = payload.host_type;
    row.status = HostStatus::Online;
    row.last_seen_ms = now_ms;
    row.agent_version = Some(payload.agent_version);
    if let Some(generation) = payload.generation {
        row.generation = Some(generation);
    }
    if let Some(os_version) = payload.os_version {
        row.os_version = Some(os_version);
    }
    if let Some(theme_color) = payload.theme_color {
        row.theme_color = Some(theme_color);
    }
    if let Some(location) = payload.location {
        row.location = Some(location);
    }
    if let Some(device_type) = payload.device_type {
        row.device_type = Some(device_type);
    }
    if let Some(repo_url) = payload.repo_url {
        row.repo_url = Some(repo_url);
    }
    if let Some(repo_dir) = payload.repo_dir {
        row.repo_dir = Some(repo_dir);
    }
    if let Some(interval) = payload.heartbeat_interval {
        row.heartbeat_interval_secs = interval;
    }
    if !freshness.is_empty() {
        row.freshness = Some(freshness);
    }
    row
}

async fn route(app: &Arc<App>, host_id: &HostId, msg: AgentToServer) {
    match msg {
        AgentToServer::Register(payload) => {
            // In-session re-register (agent restarted without dropping the
            // socket): rotate the row and re-verify freshness.
            let host = rotate_host_row(app, payload);
            app.record(Event::HostRegistered { host });
            app.lifecycle.handle_agent_reconnect(host_id);
        }
        AgentToServer::Heartbeat(payload) => {
            app.record(Event::HostSeen {
                id: host_id.clone(),
                at_ms: app.view.clock_ms(),
                generation: payload.generation,
                metrics: payload.metrics,
                lock_status: payload.update_status.map(|u| u.lock),
                system_status: payload.update_status.map(|u| u.system),
                tests_status: payload.tests_status,
                tests_generation: payload.tests_generation,
                freshness: match (payload.source_commit, payload.store_path, payload.binary_hash) {
                    (None, None, None) => None,
                    (source_commit, store_path, binary_hash) => {
                        Some(Freshness { source_commit, store_path, binary_hash })
                    }
                },
            });
            app.lifecycle.handle_heartbeat(host_id);
        }
        AgentToServer::Output(payload) => {
            let Some(active) = app.lifecycle.get_active(host_id) else { return };
            if let Err(e) = app.output.append(&active.id, &payload.line) {
                warn!(%host_id, error = %e, "failed to persist command output");
            }
            app.broadcaster.publish(Change::CommandProgress {
                command: active.id,
                host_id: host_id.clone(),
                progress: Progress::Output { line: payload.line, stream: payload.stream },
            });
        }
        AgentToServer::Status(payload) => {
            if payload.status == "killed" {
                app.lifecycle.handle_kill_confirmed(host_id, payload.exit_code);
            } else {
                debug!(%host_id, status = %payload.status, "agent status update");
            }
        }
        AgentToServer::CommandComplete(payload) => {
            let fresh = payload.fresh_status.map(|u| (u.lock, u.system));
            let active_id = app.lifecycle.get_active(host_id).map(|c| c.id);
            app.lifecycle.handle_command_complete(
                host_id,
                &payload.command,
                payload.exit_code,
                fresh,
            );
            if let Some(id) = active_id {
                app.output.release(&id);
            }
        }
        AgentToServer::CommandRejected(payload) => {
            app.lifecycle.handle_command_rejected(host_id, &payload.reason);
        }
        AgentToServer::TestProgress(payload) => {
            if let Some(active) = app.lifecycle.get_active(host_id) {
                app.broadcaster.publish(Change::CommandProgress {
                    command: active.id,
                    host_id: host_id.clone(),
                    progress: Progress::Test(payload),
                });
            }
        }
        AgentToServer::OperationProgress(payload) => {
            if let Some(active) = app.lifecycle.get_active(host_id) {
                app.broadcaster.publish(Change::CommandProgress {
                    command: active.id,
                    host_id: host_id.clone(),
                    progress: Progress::Operation(payload),
                });
            }
        }
    }
}
