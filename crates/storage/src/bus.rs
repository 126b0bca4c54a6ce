// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: WAL-backed channel between producers and the engine loop.
//!
//! Producers append events (buffered, ~10 ms durability window); the engine
//! loop consumes them in sequence order via the reader.

use crate::{Wal, WalEntry, WalError};
use fleet_core::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half. Cheap to clone; every component that records state
/// transitions holds one.
#[derive(Clone)]
pub struct EventBus {
    wal: Arc<Mutex<Wal>>,
    wake_tx: mpsc::Sender<()>,
}

/// Receiving half, held by the engine loop.
pub struct EventReader {
    wal: Arc<Mutex<Wal>>,
    wake_rx: mpsc::Receiver<()>,
}

impl EventBus {
    /// Wrap a WAL into a bus/reader pair.
    pub fn new(wal: Wal) -> (Self, EventReader) {
        let wal = Arc::new(Mutex::new(wal));
        let (wake_tx, wake_rx) = mpsc::channel(1);
        (Self { wal: Arc::clone(&wal), wake_tx }, EventReader { wal, wake_rx })
    }

    /// Append an event (not yet durable) and wake the engine loop.
    pub fn send(&self, event: Event) -> Result<u64, WalError> {
        let seq = self.wal.lock().append(&event)?;
        // Non-blocking wake; a full channel means the loop is already awake.
        let _ = self.wake_tx.try_send(());
        Ok(seq)
    }

    /// Flush buffered events to disk. The durability point.
    pub fn flush(&self) -> Result<(), WalError> {
        self.wal.lock().flush()
    }

    pub fn needs_flush(&self) -> bool {
        self.wal.lock().needs_flush()
    }

    pub fn processed_seq(&self) -> u64 {
        self.wal.lock().processed_seq()
    }
}

impl EventReader {
    /// Wait for and return the next unprocessed entry.
    ///
    /// `Ok(None)` once every sender has been dropped and the log is drained.
    pub async fn recv(&mut self) -> Result<Option<WalEntry>, WalError> {
        loop {
            {
                let mut wal = self.wal.lock();
                if let Some(entry) = wal.next_unprocessed()? {
                    return Ok(Some(entry));
                }
            }
            if self.wake_rx.recv().await.is_none() {
                return Ok(None);
            }
        }
    }

    /// Record that the engine has consumed `seq`. Persisted via snapshots.
    pub fn mark_processed(&self, seq: u64) {
        self.wal.lock().mark_processed(seq);
    }

    /// Shared WAL handle for the checkpoint task.
    pub fn wal(&self) -> Arc<Mutex<Wal>> {
        Arc::clone(&self.wal)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
