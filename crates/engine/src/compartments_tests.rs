// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::OpRegistry;
use fleet_core::{test_support, HostStatus, RemoteVersion};

const TTL_MS: u64 = 60_000;
const NOW_MS: u64 = 1_700_000_000_000;

fn evaluator() -> Evaluator {
    Evaluator::new(Arc::new(OpRegistry::builtin()), "0.2.0", TTL_MS)
}

fn remote_current() -> RemoteState {
    RemoteState::Available {
        version: RemoteVersion {
            git_commit: "commit-a".into(),
            lock_hash: "lock-a".into(),
            fetched_at_ms: NOW_MS,
        },
    }
}

fn remote_failed() -> RemoteState {
    RemoteState::Error { message: "connect refused".into(), at_ms: NOW_MS }
}

#[test]
fn all_green_when_everything_matches() {
    let host = test_support::host("h-1");
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);

    assert_eq!(c.git.status, CompartmentStatus::Ok);
    assert_eq!(c.lock.status, CompartmentStatus::Ok);
    assert_eq!(c.system.status, CompartmentStatus::Ok);
    assert_eq!(c.agent.status, CompartmentStatus::Ok);
    // Fixture never ran tests
    assert_eq!(c.tests.status, CompartmentStatus::Unknown);
}

#[test]
fn git_outdated_when_generation_differs() {
    let mut host = test_support::host("h-1");
    host.generation = Some("commit-old".into());
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);

    assert_eq!(c.git.status, CompartmentStatus::Outdated);
    // System cannot be greener than git
    assert_ne!(c.system.status, CompartmentStatus::Ok);
}

#[test]
fn remote_failure_degrades_system_and_tests() {
    let mut host = test_support::host("h-1");
    host.tests_status = AgentReported::Ok;
    host.tests_generation = host.generation.clone();

    let c = evaluator().evaluate(&host, &remote_failed(), NOW_MS);

    assert_eq!(c.git.status, CompartmentStatus::Error);
    assert_eq!(c.lock.status, CompartmentStatus::Error);
    assert_eq!(c.system.status, CompartmentStatus::Outdated);
    assert_eq!(c.system.message, "verification degraded");
    assert_eq!(c.tests.status, CompartmentStatus::Outdated);
    assert_eq!(c.tests.message, "verification degraded");
}

#[test]
fn remote_ttl_expiry_is_an_error_not_unknown() {
    let host = test_support::host("h-1");
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS + TTL_MS + 1);

    assert_eq!(c.git.status, CompartmentStatus::Error);
    assert_ne!(c.system.status, CompartmentStatus::Ok);
}

#[test]
fn system_never_greener_than_inputs() {
    // Agent claims system ok, but git is behind: system must not be ok.
    let mut host = test_support::host("h-1");
    host.generation = Some("commit-old".into());
    host.system_status = AgentReported::Ok;

    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.system.status, CompartmentStatus::Outdated);
}

#[test]
fn system_ok_implies_inputs_ok() {
    // Sweep agent-reported combinations; whenever System comes out ok,
    // both Git and Lock must be ok too.
    let statuses = [
        AgentReported::Ok,
        AgentReported::Outdated,
        AgentReported::Error,
        AgentReported::Unknown,
    ];
    let remotes = [RemoteState::Unknown, remote_current(), remote_failed()];

    for lock in statuses {
        for system in statuses {
            for remote in &remotes {
                let mut host = test_support::host("h-1");
                host.lock_status = lock;
                host.system_status = system;
                let c = evaluator().evaluate(&host, remote, NOW_MS);
                if c.system.status == CompartmentStatus::Ok {
                    assert_eq!(c.git.status, CompartmentStatus::Ok, "{lock:?}/{system:?}");
                    assert_eq!(c.lock.status, CompartmentStatus::Ok, "{lock:?}/{system:?}");
                }
            }
        }
    }
}

#[test]
fn agent_lock_error_makes_system_error() {
    let mut host = test_support::host("h-1");
    host.lock_status = AgentReported::Error;
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);

    assert_eq!(c.lock.status, CompartmentStatus::Error);
    assert_eq!(c.system.status, CompartmentStatus::Error);
}

#[test]
fn tests_for_older_generation_are_outdated() {
    let mut host = test_support::host("h-1");
    host.tests_status = AgentReported::Ok;
    host.tests_generation = Some("commit-old".into());

    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.tests.status, CompartmentStatus::Outdated);
    assert_eq!(c.tests.message, "outdated for current deployed state");
}

#[test]
fn tests_for_current_generation_are_ok() {
    let mut host = test_support::host("h-1");
    host.tests_status = AgentReported::Ok;
    host.tests_generation = host.generation.clone();

    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.tests.status, CompartmentStatus::Ok);
}

#[test]
fn agent_compartment_tracks_version() {
    let mut host = test_support::host("h-1");
    host.agent_version = Some("0.1.9".into());
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.agent.status, CompartmentStatus::Outdated);

    host.status = HostStatus::Offline;
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.agent.status, CompartmentStatus::Error);

    host.agent_version = None;
    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.agent.status, CompartmentStatus::Unknown);
}

#[test]
fn pending_command_overlays_working() {
    let mut host = test_support::host("h-1");
    host.pending_command = Some("pull".into());
    host.generation = Some("commit-old".into());

    let c = evaluator().evaluate(&host, &remote_current(), NOW_MS);
    assert_eq!(c.git.status, CompartmentStatus::Working);
    assert_eq!(c.lock.status, CompartmentStatus::Working);
    // System not in pull's working set
    assert_ne!(c.system.status, CompartmentStatus::Working);
}
