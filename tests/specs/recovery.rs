// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: WAL + snapshot rebuild the active-command table.

use super::prelude::*;
use fleet_storage::{MaterializedState, Snapshot, Wal};
use tempfile::tempdir;

/// Replay a file-backed WAL into fresh state, like the daemon does at boot.
fn replay(path: &std::path::Path) -> MaterializedState {
    let mut wal = Wal::open(path, 0).unwrap();
    let mut state = MaterializedState::default();
    for entry in wal.entries_after(0).unwrap() {
        state.apply_event(&entry.event);
    }
    state
}

#[tokio::test]
async fn mid_command_state_survives_a_wal_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");

    // First process life: dispatch a command, then "crash"
    let recovered = {
        let h = harness();
        h.add_host("h-1");
        h.remote_current();
        behind_remote(&h, "h-1");
        h.lifecycle
            .execute_op("pull", &hid("h-1"), false, None, "admin", &no_args())
            .await
            .unwrap();

        // Copy the in-memory WAL contents to disk the way the flush task
        // would have
        let mut disk = Wal::open(&path, 0).unwrap();
        let entries = h.wal.lock().entries_after(0).unwrap();
        for entry in entries {
            disk.append(&entry.event).unwrap();
        }
        disk.flush().unwrap();
        replay(&path)
    };

    // Recovered rows: the non-terminal command and its pending marker
    let active = recovered.active_commands();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].op_id, "pull");
    assert_eq!(active[0].status, CommandStatus::Executing);
    assert_eq!(
        recovered.host(&hid("h-1")).unwrap().pending_command.as_deref(),
        Some("pull")
    );

    // Second process life over the recovered state
    let h2 = harness();
    *h2.state.lock() = recovered;
    h2.lifecycle.recover();
    assert!(h2.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn command_past_its_bound_resurfaces_as_timeout_pending() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();
    behind_remote(&h, "h-1");
    h.lifecycle.execute_op("pull", &hid("h-1"), false, None, "admin", &no_args()).await.unwrap();

    let h2 = harness();
    *h2.state.lock() = h.state.lock().clone();
    // Recovered long after the pull's 5-minute hard bound
    h2.clock.set_epoch_ms(h.clock.epoch_ms() + 60 * 60 * 1000);
    h2.lifecycle.recover();

    assert_eq!(last_command(&h2, "h-1").status, CommandStatus::TimeoutPending);
    assert!(h2.lifecycle.has_active(&hid("h-1")));
}

#[tokio::test]
async fn snapshot_and_tail_compose() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("events.wal");
    let snapshot_path = dir.path().join("state.snapshot");

    // Build state, snapshot it at seq N, then add tail events
    let h = harness();
    h.add_host("h-1");
    {
        let mut disk = Wal::open(&wal_path, 0).unwrap();
        for entry in h.wal.lock().entries_after(0).unwrap() {
            disk.append(&entry.event).unwrap();
        }
        disk.flush().unwrap();
        let seq = disk.write_seq();
        Snapshot::new(seq, h.state.lock().clone()).save(&snapshot_path).unwrap();

        disk.append(&Event::HostColorSet { id: hid("h-1"), color: "#123456".into() })
            .unwrap();
        disk.flush().unwrap();
    }

    // Boot: snapshot + entries after its seq
    let snapshot = Snapshot::load(&snapshot_path).unwrap().unwrap();
    let mut state = snapshot.state;
    let mut wal = Wal::open(&wal_path, snapshot.seq).unwrap();
    for entry in wal.entries_after(snapshot.seq).unwrap() {
        state.apply_event(&entry.event);
    }

    let host = state.host(&hid("h-1")).unwrap();
    assert_eq!(host.theme_color.as_deref(), Some("#123456"));
}
