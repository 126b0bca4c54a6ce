// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser websocket connections: init on attach, get_state on demand.

use crate::app::App;
use crate::hub::{HubCmd, CLIENT_QUEUE};
use axum::extract::ws::{Message, WebSocket};
use fleet_wire::{BrowserToServer, SyncMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Drive one authenticated browser connection.
pub async fn run(app: Arc<App>, socket: WebSocket) {
    let conn_id = app.next_conn_id();
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<SyncMessage>(CLIENT_QUEUE);
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match fleet_wire::encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "failed to encode sync frame");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Registration delivers the versioned init frame through the queue.
    app.hub.send(HubCmd::RegisterBrowser { conn_id, tx }).await;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match fleet_wire::decode::<BrowserToServer>(&text) {
            Ok(BrowserToServer::GetState) => {
                app.hub.send(HubCmd::SendFullState { conn_id }).await;
            }
            Err(e) => debug!(conn_id, error = %e, "undecodable browser frame"),
        }
    }

    app.hub.send(HubCmd::UnregisterBrowser { conn_id }).await;
    writer.abort();
}
