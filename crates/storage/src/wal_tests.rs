// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{Event, HostId};

fn offline(n: u64) -> Event {
    Event::HostOffline { id: HostId::new(format!("h-{n}")), at_ms: n }
}

fn seq_of(event: &Event) -> u64 {
    match event {
        Event::HostOffline { at_ms, .. } => *at_ms,
        _ => 0,
    }
}

#[test]
fn append_assigns_increasing_seqs() {
    let mut wal = Wal::in_memory();
    assert_eq!(wal.append(&offline(1)).unwrap(), 1);
    assert_eq!(wal.append(&offline(2)).unwrap(), 2);
    assert_eq!(wal.write_seq(), 2);
}

#[test]
fn memory_wal_round_trips_entries() {
    let mut wal = Wal::in_memory();
    wal.append(&offline(1)).unwrap();
    wal.append(&offline(2)).unwrap();

    let first = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(seq_of(&first.event), 1);
    wal.mark_processed(first.seq);

    let second = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(second.seq, 2);
    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn file_wal_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&offline(1)).unwrap();
        wal.append(&offline(2)).unwrap();
        wal.flush().unwrap();
    }

    // Reopen with processed_seq = 1: only entry 2 is unprocessed.
    let mut wal = Wal::open(&path, 1).unwrap();
    assert_eq!(wal.write_seq(), 2);
    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 2);
    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn entries_after_filters_by_seq() {
    let mut wal = Wal::in_memory();
    for n in 1..=5 {
        wal.append(&offline(n)).unwrap();
    }
    let entries = wal.entries_after(3).unwrap();
    assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
}

#[test]
fn truncate_before_drops_old_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    let mut wal = Wal::open(&path, 0).unwrap();
    for n in 1..=4 {
        let seq = wal.append(&offline(n)).unwrap();
        wal.mark_processed(seq);
    }
    wal.truncate_before(3).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);

    // Still appendable after truncation
    let seq = wal.append(&offline(5)).unwrap();
    assert_eq!(seq, 5);
}

#[test]
fn corrupt_tail_is_rotated_keeping_valid_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&offline(1)).unwrap();
        wal.append(&offline(2)).unwrap();
        wal.flush().unwrap();
    }
    // Simulate a torn write
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"seq\":3,\"event\":{\"type\":\"host_off").unwrap();
    }

    let mut wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);
    assert_eq!(wal.entries_after(0).unwrap().len(), 2);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn next_unprocessed_flushes_pending_writes() {
    let mut wal = Wal::in_memory();
    wal.append(&offline(1)).unwrap();
    // No explicit flush: the read side must see buffered entries.
    assert!(wal.next_unprocessed().unwrap().is_some());
}

#[test]
fn memory_truncate_preserves_read_position() {
    let mut wal = Wal::in_memory();
    for n in 1..=4 {
        wal.append(&offline(n)).unwrap();
    }
    // Process the first two
    for _ in 0..2 {
        let entry = wal.next_unprocessed().unwrap().unwrap();
        wal.mark_processed(entry.seq);
    }
    wal.truncate_before(2).unwrap();

    // Entry 3 is the next unprocessed one
    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 3);
}
