// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleet-storage: Durable truth for hosts, commands, pipelines, and events.
//!
//! Event-sourced: an append-only JSONL WAL records every state change before
//! it takes effect; the in-memory [`MaterializedState`] is derived by replay
//! from the latest snapshot. The event-log-first ordering makes lifecycle
//! transitions atomic with their audit trail by construction.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bus;
mod snapshot;
pub mod state;
mod wal;

pub use bus::{EventBus, EventReader};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::MaterializedState;
pub use wal::{Wal, WalEntry, WalError};
