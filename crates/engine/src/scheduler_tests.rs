// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timers_fire_at_deadline() {
    let mut scheduler = Scheduler::new();
    let t0 = Instant::now();
    scheduler.set("warn:c-1", Duration::from_secs(10), t0);
    scheduler.set("hard:c-1", Duration::from_secs(60), t0);

    assert!(scheduler.fired(t0 + Duration::from_secs(5)).is_empty());

    let fired = scheduler.fired(t0 + Duration::from_secs(10));
    assert_eq!(fired, vec!["warn:c-1".to_string()]);

    // A fired timer is consumed
    assert!(scheduler.fired(t0 + Duration::from_secs(11)).is_empty());

    let fired = scheduler.fired(t0 + Duration::from_secs(61));
    assert_eq!(fired, vec!["hard:c-1".to_string()]);
    assert!(scheduler.is_empty());
}

#[test]
fn fired_returns_earliest_first() {
    let mut scheduler = Scheduler::new();
    let t0 = Instant::now();
    scheduler.set("b", Duration::from_secs(2), t0);
    scheduler.set("a", Duration::from_secs(1), t0);

    let fired = scheduler.fired(t0 + Duration::from_secs(3));
    assert_eq!(fired, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn set_rearms_existing_key() {
    let mut scheduler = Scheduler::new();
    let t0 = Instant::now();
    scheduler.set("hard:c-1", Duration::from_secs(10), t0);
    // Extend: re-arm from a later now
    scheduler.set("hard:c-1", Duration::from_secs(10), t0 + Duration::from_secs(8));

    assert!(scheduler.fired(t0 + Duration::from_secs(10)).is_empty());
    assert_eq!(scheduler.fired(t0 + Duration::from_secs(18)).len(), 1);
}

#[test]
fn cancel_and_prefix_cancel() {
    let mut scheduler = Scheduler::new();
    let t0 = Instant::now();
    scheduler.set("warn:c-1", Duration::from_secs(1), t0);
    scheduler.set("hard:c-1", Duration::from_secs(1), t0);
    scheduler.set("hard:c-2", Duration::from_secs(1), t0);

    scheduler.cancel("warn:c-1");
    assert!(!scheduler.is_set("warn:c-1"));

    scheduler.cancel_prefix("hard:");
    assert!(scheduler.is_empty());
}
