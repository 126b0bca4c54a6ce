// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: single-instance lock, snapshot load, WAL replay.

use crate::env::Config;
use fleet_storage::{EventBus, EventReader, MaterializedState, Snapshot, SnapshotError, Wal, WalError};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("another fleetd already holds the state dir lock")]
    LockFailed,
    #[error("no usable state directory (set FLEET_STATE_DIR or HOME)")]
    NoStateDir,
}

pub struct StartupResult {
    pub state: Arc<Mutex<MaterializedState>>,
    pub bus: EventBus,
    pub reader: EventReader,
    /// Held for the process lifetime; dropping releases the instance lock.
    pub lock_file: File,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Acquire the instance lock, load the snapshot, and replay the WAL tail.
pub fn startup(config: &Config) -> Result<StartupResult, StartupError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(config.output_dir())?;

    let lock_file = File::create(config.lock_path())?;
    lock_file.try_lock_exclusive().map_err(|_| StartupError::LockFailed)?;

    let snapshot = Snapshot::load(&config.snapshot_path())?;
    let (mut state, processed_seq) = match snapshot {
        Some(snapshot) => {
            info!(seq = snapshot.seq, "loaded snapshot");
            (snapshot.state, snapshot.seq)
        }
        None => (MaterializedState::default(), 0),
    };

    let mut wal = Wal::open(&config.wal_path(), processed_seq)?;
    let tail = wal.entries_after(processed_seq)?;
    if !tail.is_empty() {
        info!(entries = tail.len(), "replaying WAL tail");
    }
    let mut last_seq = processed_seq;
    for entry in &tail {
        state.apply_event(&entry.event);
        last_seq = entry.seq;
    }
    // Reopen positioned past the replayed tail so the engine loop does not
    // see boot-time events a second time.
    drop(wal);
    let wal = Wal::open(&config.wal_path(), last_seq)?;

    let state = Arc::new(Mutex::new(state));
    let (bus, reader) = EventBus::new(wal);

    Ok(StartupResult { state, bus, reader, lock_file })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
