// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent transport facade.
//!
//! The engine only ever sends a command or a kill to a host; everything else
//! about the agent channel (sockets, queues, auth) belongs to the daemon.

use async_trait::async_trait;
use fleet_core::HostId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("agent not connected")]
    NotConnected,
    #[error("agent send queue full")]
    QueueFull,
    #[error("peer gone: {0}")]
    PeerGone(String),
}

/// Message-based send facade the Lifecycle Manager drives.
#[async_trait]
pub trait AgentTransport: Send + Sync + 'static {
    async fn send_command(&self, host: &HostId, op: &str) -> Result<(), TransportError>;

    async fn send_kill(
        &self,
        host: &HostId,
        signal: &str,
        pid: Option<u32>,
    ) -> Result<(), TransportError>;
}
