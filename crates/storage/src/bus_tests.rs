// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::{Event, HostId};

fn offline(n: u64) -> Event {
    Event::HostOffline { id: HostId::new("h-1"), at_ms: n }
}

#[tokio::test]
async fn events_flow_in_order() {
    let (bus, mut reader) = EventBus::new(Wal::in_memory());

    bus.send(offline(1)).unwrap();
    bus.send(offline(2)).unwrap();

    let first = reader.recv().await.unwrap().unwrap();
    assert_eq!(first.seq, 1);
    reader.mark_processed(first.seq);

    let second = reader.recv().await.unwrap().unwrap();
    assert_eq!(second.seq, 2);
    reader.mark_processed(second.seq);
    assert_eq!(bus.processed_seq(), 2);
}

#[tokio::test]
async fn recv_returns_none_when_all_senders_dropped() {
    let (bus, mut reader) = EventBus::new(Wal::in_memory());
    bus.send(offline(1)).unwrap();
    drop(bus);

    assert!(reader.recv().await.unwrap().is_some());
    assert!(reader.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn sends_while_reader_waits_wake_it() {
    let (bus, mut reader) = EventBus::new(Wal::in_memory());

    let handle = tokio::spawn(async move { reader.recv().await.unwrap().map(|e| e.seq) });
    tokio::task::yield_now().await;
    bus.send(offline(7)).unwrap();

    assert_eq!(handle.await.unwrap(), Some(1));
}
