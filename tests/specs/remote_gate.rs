// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote fetch failures must degrade System/Tests everywhere.

use super::prelude::*;
use fleet_core::CompartmentStatus;
use fleet_engine::{Evaluator, OpRegistry};
use std::sync::Arc;

fn evaluate(h: &Harness, host: &str) -> fleet_core::Compartments {
    let state = h.state.lock();
    let row = state.host(&hid(host)).unwrap();
    Evaluator::new(Arc::new(OpRegistry::builtin()), "0.2.0", 60_000).evaluate(
        row,
        &state.remote,
        h.clock.epoch_ms(),
    )
}

#[tokio::test]
async fn fetch_failure_degrades_previously_green_host() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();

    // Everything green while the remote is reachable
    let c = evaluate(&h, "h-1");
    assert_eq!(c.system.status, CompartmentStatus::Ok);

    // Remote goes away
    h.apply(Event::RemoteVersionFailed {
        error: "connect refused".to_string(),
        at_ms: h.clock.epoch_ms(),
    });

    let c = evaluate(&h, "h-1");
    assert_eq!(c.git.status, CompartmentStatus::Error);
    assert_eq!(c.system.status, CompartmentStatus::Outdated);
    assert_eq!(c.system.message, "verification degraded");
    assert_ne!(c.tests.status, CompartmentStatus::Ok);

    // No evaluation path reports System=ok until a successful fetch
    h.clock.advance_ms(60_000);
    let c = evaluate(&h, "h-1");
    assert_ne!(c.system.status, CompartmentStatus::Ok);

    h.remote_current();
    let c = evaluate(&h, "h-1");
    assert_eq!(c.system.status, CompartmentStatus::Ok);
}

#[tokio::test]
async fn ttl_expiry_behaves_like_a_failed_fetch() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();

    h.clock.advance_ms(61_000);
    let c = evaluate(&h, "h-1");
    assert_eq!(c.git.status, CompartmentStatus::Error);
    assert_ne!(c.system.status, CompartmentStatus::Ok);
}

#[tokio::test]
async fn system_rank_never_exceeds_inputs_with_remote_available() {
    let h = harness();
    h.add_host("h-1");
    h.remote_current();

    for lock in [
        AgentReported::Ok,
        AgentReported::Outdated,
        AgentReported::Error,
        AgentReported::Unknown,
    ] {
        for system in [AgentReported::Ok, AgentReported::Outdated, AgentReported::Unknown] {
            {
                let mut state = h.state.lock();
                let host = state.hosts.get_mut(&hid("h-1")).unwrap();
                host.lock_status = lock;
                host.system_status = system;
            }
            let c = evaluate(&h, "h-1");
            if c.system.status == CompartmentStatus::Ok {
                assert_eq!(c.git.status, CompartmentStatus::Ok);
                assert_eq!(c.lock.status, CompartmentStatus::Ok);
            }
        }
    }
}
