// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compartment evaluator: derives the five per-host status values.
//!
//! Inputs are read-only: the host row, the TTL-checked remote desired state,
//! and the dashboard's own version. The same function backs both delta
//! emission and full-state construction, so the remote-gate rule cannot
//! drift between the two paths.
//!
//! Remote gate: when the remote desired state cannot be fetched, System and
//! Tests are never green. They degrade to `outdated` ("verification
//! degraded"), or `unknown` when the underlying agent signal is missing too.

use crate::registry::{OpRegistry, WorkingSlot};
use fleet_core::version::RemoteView;
use fleet_core::{
    AgentReported, Compartment, Compartments, CompartmentStatus, Host, RemoteState,
};
use std::sync::Arc;

pub struct Evaluator {
    registry: Arc<OpRegistry>,
    dashboard_version: String,
    remote_ttl_ms: u64,
}

impl Evaluator {
    pub fn new(registry: Arc<OpRegistry>, dashboard_version: impl Into<String>, remote_ttl_ms: u64) -> Self {
        Self { registry, dashboard_version: dashboard_version.into(), remote_ttl_ms }
    }

    /// Derive all five compartments for a host.
    pub fn evaluate(&self, host: &Host, remote: &RemoteState, now_ms: u64) -> Compartments {
        let remote = remote.view(now_ms, self.remote_ttl_ms);

        let git = git_compartment(host, &remote);
        let lock = lock_compartment(host, &remote);
        let system = system_compartment(host, &remote, &git, &lock);
        let tests = tests_compartment(host, &remote);
        let agent = agent_compartment(host, &self.dashboard_version);

        let mut compartments = Compartments { agent, git, lock, system, tests };
        self.overlay_working(host, &mut compartments);
        compartments
    }

    /// Blue "working" overlay for the op currently in flight.
    fn overlay_working(&self, host: &Host, compartments: &mut Compartments) {
        let Some(op_id) = host.pending_command.as_deref() else { return };
        let Some(op) = self.registry.get(op_id) else { return };
        for slot in op.working {
            let target = match slot {
                WorkingSlot::Agent => &mut compartments.agent,
                WorkingSlot::Git => &mut compartments.git,
                WorkingSlot::Lock => &mut compartments.lock,
                WorkingSlot::System => &mut compartments.system,
                WorkingSlot::Tests => &mut compartments.tests,
            };
            *target = Compartment::working(format!("{op_id} running"));
        }
    }
}

fn git_compartment(host: &Host, remote: &RemoteView<'_>) -> Compartment {
    match remote {
        RemoteView::Error(message) => Compartment::error(format!("remote fetch failed: {message}")),
        RemoteView::Unknown => Compartment::unknown("remote version not yet fetched"),
        RemoteView::Ok(version) => match host.generation.as_deref() {
            None => Compartment::unknown("no generation reported"),
            Some(generation) if generation == version.git_commit => {
                Compartment::ok("matches remote commit")
            }
            Some(_) => Compartment::outdated("behind remote commit"),
        },
    }
}

fn lock_compartment(host: &Host, remote: &RemoteView<'_>) -> Compartment {
    if host.lock_status == AgentReported::Error {
        return Compartment::error("agent reports lock error");
    }
    match remote {
        RemoteView::Error(message) => Compartment::error(format!("remote fetch failed: {message}")),
        RemoteView::Unknown => Compartment::unknown("remote version not yet fetched"),
        RemoteView::Ok(_) => match host.lock_status {
            AgentReported::Ok => Compartment::ok("matches remote lock"),
            AgentReported::Outdated => Compartment::outdated("lock behind remote"),
            AgentReported::Unknown => Compartment::unknown("agent has not reported"),
            AgentReported::Error => Compartment::error("agent reports lock error"),
        },
    }
}

/// System may never be greener than its inputs, and is remote-gated: without
/// a trustworthy remote version it can at best be `outdated`.
fn system_compartment(
    host: &Host,
    remote: &RemoteView<'_>,
    git: &Compartment,
    lock: &Compartment,
) -> Compartment {
    if host.system_status == AgentReported::Error {
        return Compartment::error("agent reports system error");
    }
    if host.lock_status == AgentReported::Error {
        return Compartment::error("lock error blocks system verification");
    }

    if !matches!(remote, RemoteView::Ok(_)) {
        return match host.system_status {
            AgentReported::Unknown => Compartment::unknown("verification degraded"),
            _ => Compartment::outdated("verification degraded"),
        };
    }

    match host.system_status {
        AgentReported::Unknown => Compartment::unknown("no system signal"),
        AgentReported::Outdated => Compartment::outdated("system behind configuration"),
        AgentReported::Ok => {
            if git.status == CompartmentStatus::Ok && lock.status == CompartmentStatus::Ok {
                Compartment::ok("system matches desired state")
            } else {
                Compartment::outdated("inputs not current")
            }
        }
        AgentReported::Error => Compartment::error("agent reports system error"),
    }
}

fn tests_compartment(host: &Host, remote: &RemoteView<'_>) -> Compartment {
    let never_ran = host.tests_status == AgentReported::Unknown && host.tests_generation.is_none();
    if never_ran {
        return Compartment::unknown("never run");
    }
    if host.tests_status == AgentReported::Error {
        return Compartment::error("test infrastructure error");
    }

    if !matches!(remote, RemoteView::Ok(_)) {
        return match host.tests_status {
            AgentReported::Unknown => Compartment::unknown("verification degraded"),
            _ => Compartment::outdated("verification degraded"),
        };
    }

    match host.tests_status {
        AgentReported::Ok => {
            if host.tests_generation == host.generation {
                Compartment::ok("tests passed for deployed state")
            } else {
                Compartment::outdated("outdated for current deployed state")
            }
        }
        AgentReported::Outdated => Compartment::outdated("tests failed"),
        AgentReported::Unknown => Compartment::unknown("no test signal"),
        AgentReported::Error => Compartment::error("test infrastructure error"),
    }
}

fn agent_compartment(host: &Host, dashboard_version: &str) -> Compartment {
    match host.agent_version.as_deref() {
        None => Compartment::unknown("not reported"),
        Some(version) if version == dashboard_version => Compartment::ok("up to date"),
        Some(version) => {
            if host.is_online() {
                Compartment::outdated(format!("agent {version} != dashboard {dashboard_version}"))
            } else {
                Compartment::error(format!("agent {version} outdated and unreachable"))
            }
        }
    }
}

#[cfg(test)]
#[path = "compartments_tests.rs"]
mod tests;
