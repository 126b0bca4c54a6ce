// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The op registry: the immutable catalog of everything a host can be told
//! to do.
//!
//! An op is a record of function-valued capabilities (validate, post-check)
//! plus its timeouts and policy flags. Validators are pure functions of a
//! host snapshot and return structured errors with a machine code.

use fleet_core::op::{ops, OpExecutor};
use fleet_core::{
    CommandStatus, Compartments, CompartmentStatus, ErrorCode, Host, ValidationError,
};
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot view a validator sees: the host row, its derived compartments,
/// and whether a command is already in flight.
pub struct HostView<'a> {
    pub host: &'a Host,
    pub compartments: &'a Compartments,
    pub busy: bool,
}

pub type Validate = fn(&HostView<'_>) -> Result<(), ValidationError>;

/// Which post-check policy applies after an op exits 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCheck {
    /// Exit 0 is enough.
    None,
    /// Lock must come back ok; generation advance alone is PARTIAL.
    Pull,
    /// System must be ok after the agent reconnects.
    Switch,
    /// Both Git and System must become ok; Git alone is PARTIAL.
    PullSwitch,
    /// Tests must pass for the currently deployed generation.
    Test,
}

/// Compartment slots an op lights up as "working" while it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingSlot {
    Agent,
    Git,
    Lock,
    System,
    Tests,
}

/// An atomic, validated operation on a single host.
pub struct Op {
    pub id: &'static str,
    pub description: &'static str,
    pub executor: OpExecutor,
    pub validate: Validate,
    pub post_check: PostCheck,
    pub timeout: Duration,
    pub warning_timeout: Duration,
    /// Only set for ops that replace the running agent binary.
    pub reconnect_timeout: Option<Duration>,
    pub retryable: bool,
    pub requires_totp: bool,
    /// Deliverable while a command runs (restart/stop/kill).
    pub control: bool,
    pub working: &'static [WorkingSlot],
}

/// Immutable op catalog, populated once at startup.
pub struct OpRegistry {
    ops: HashMap<&'static str, Op>,
}

impl OpRegistry {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut ops_map = HashMap::new();
        for op in builtin_ops() {
            ops_map.insert(op.id, op);
        }
        Self { ops: ops_map }
    }

    pub fn get(&self, id: &str) -> Option<&Op> {
        self.ops.get(id)
    }

    /// All op ids, sorted for stable iteration.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.ops.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Server-computed op availability for one host.
    ///
    /// Busy hosts expose only the control and timeout-resolution ops; idle
    /// hosts expose every op whose validator passes. The client renders
    /// exactly this list.
    pub fn available_ops(
        &self,
        host: &Host,
        compartments: &Compartments,
        active_status: Option<CommandStatus>,
    ) -> Vec<String> {
        if let Some(status) = active_status {
            let mut available = vec![ops::STOP.to_string(), ops::KILL.to_string()];
            if status == CommandStatus::TimeoutPending {
                available.push(ops::EXTEND_TIMEOUT.to_string());
                available.push(ops::CANCEL.to_string());
            }
            return available;
        }

        let view = HostView { host, compartments, busy: false };
        let mut available: Vec<String> = self
            .ops
            .values()
            .filter(|op| (op.validate)(&view).is_ok())
            .map(|op| op.id.to_string())
            .collect();
        available.sort_unstable();
        available
    }
}

fn err(code: ErrorCode, message: &str) -> ValidationError {
    ValidationError::new(code, message)
}

fn require_online(view: &HostView<'_>) -> Result<(), ValidationError> {
    if !view.host.is_online() {
        return Err(err(ErrorCode::Offline, "host is offline"));
    }
    Ok(())
}

fn require_idle(view: &HostView<'_>) -> Result<(), ValidationError> {
    if view.busy {
        return Err(err(ErrorCode::Busy, "a command is already running"));
    }
    Ok(())
}

fn validate_pull(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)?;
    require_idle(view)?;
    match view.compartments.git.status {
        CompartmentStatus::Ok => Err(err(ErrorCode::AlreadyCurrent, "already on the remote commit")),
        CompartmentStatus::Error => {
            Err(err(ErrorCode::RemoteUnavailable, "remote version unavailable"))
        }
        _ => Ok(()),
    }
}

fn validate_switch(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)?;
    require_idle(view)?;
    if view.compartments.lock.status == CompartmentStatus::Outdated {
        return Err(err(ErrorCode::LockOutdated, "lock is outdated, pull first"));
    }
    if view.compartments.git.status == CompartmentStatus::Outdated {
        return Err(err(ErrorCode::GitOutdated, "checkout is outdated, pull first"));
    }
    if view.compartments.system.status == CompartmentStatus::Ok {
        return Err(err(ErrorCode::AlreadyCurrent, "system is already current"));
    }
    Ok(())
}

fn validate_pull_switch(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)?;
    require_idle(view)?;
    if view.compartments.git.status == CompartmentStatus::Error {
        return Err(err(ErrorCode::RemoteUnavailable, "remote version unavailable"));
    }
    if view.compartments.git.status == CompartmentStatus::Ok
        && view.compartments.system.status == CompartmentStatus::Ok
    {
        return Err(err(ErrorCode::AlreadyCurrent, "checkout and system are already current"));
    }
    Ok(())
}

fn validate_online_idle(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)?;
    require_idle(view)
}

/// Control ops skip the idle check: they must be deliverable mid-command.
fn validate_online_only(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)
}

fn validate_kill(view: &HostView<'_>) -> Result<(), ValidationError> {
    require_online(view)?;
    if !view.busy {
        return Err(err(ErrorCode::NoPending, "no command to kill"));
    }
    Ok(())
}

fn validate_always(_view: &HostView<'_>) -> Result<(), ValidationError> {
    Ok(())
}

fn validate_remove(view: &HostView<'_>) -> Result<(), ValidationError> {
    if view.host.is_online() {
        return Err(err(ErrorCode::Busy, "host must be offline before removal"));
    }
    Ok(())
}

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn agent_op(
    id: &'static str,
    description: &'static str,
    validate: Validate,
    timeout: Duration,
    warning_timeout: Duration,
    working: &'static [WorkingSlot],
) -> Op {
    Op {
        id,
        description,
        executor: OpExecutor::Agent,
        validate,
        post_check: PostCheck::None,
        timeout,
        warning_timeout,
        reconnect_timeout: None,
        retryable: false,
        requires_totp: false,
        control: false,
        working,
    }
}

fn dashboard_op(id: &'static str, description: &'static str, validate: Validate) -> Op {
    Op {
        id,
        description,
        executor: OpExecutor::Dashboard,
        validate,
        post_check: PostCheck::None,
        timeout: secs(60),
        warning_timeout: secs(30),
        reconnect_timeout: None,
        retryable: false,
        requires_totp: false,
        control: false,
        working: &[],
    }
}

fn builtin_ops() -> Vec<Op> {
    use WorkingSlot::*;

    vec![
        Op {
            post_check: PostCheck::Pull,
            retryable: true,
            ..agent_op(
                ops::PULL,
                "Pull the latest configuration commit",
                validate_pull,
                mins(5),
                mins(2),
                &[Git, Lock],
            )
        },
        Op {
            post_check: PostCheck::Switch,
            reconnect_timeout: Some(secs(120)),
            ..agent_op(
                ops::SWITCH,
                "Rebuild and switch to the pulled configuration",
                validate_switch,
                mins(15),
                mins(5),
                &[System],
            )
        },
        Op {
            post_check: PostCheck::PullSwitch,
            reconnect_timeout: Some(secs(120)),
            ..agent_op(
                ops::PULL_SWITCH,
                "Pull and switch in one step",
                validate_pull_switch,
                mins(20),
                mins(5),
                &[Git, System],
            )
        },
        Op {
            post_check: PostCheck::Test,
            retryable: true,
            ..agent_op(
                ops::TEST,
                "Run the host test suite",
                validate_online_idle,
                mins(30),
                mins(10),
                &[Tests],
            )
        },
        Op {
            control: true,
            ..agent_op(
                ops::RESTART,
                "Restart the agent process",
                validate_online_only,
                secs(60),
                secs(30),
                &[Agent],
            )
        },
        Op {
            control: true,
            ..agent_op(
                ops::STOP,
                "Stop the agent process",
                validate_online_only,
                secs(60),
                secs(30),
                &[Agent],
            )
        },
        Op {
            control: true,
            ..agent_op(
                ops::KILL,
                "Kill the running command",
                validate_kill,
                secs(30),
                secs(15),
                &[],
            )
        },
        Op {
            requires_totp: true,
            ..agent_op(
                ops::REBOOT,
                "Reboot the host",
                validate_online_idle,
                mins(10),
                mins(2),
                &[System],
            )
        },
        agent_op(
            ops::REFRESH_GIT,
            "Probe the checkout state",
            validate_online_idle,
            secs(60),
            secs(30),
            &[Git],
        ),
        agent_op(
            ops::REFRESH_LOCK,
            "Probe the lock state",
            validate_online_idle,
            secs(60),
            secs(30),
            &[Lock],
        ),
        agent_op(
            ops::REFRESH_SYSTEM,
            "Probe the system state",
            validate_online_idle,
            secs(60),
            secs(30),
            &[System],
        ),
        agent_op(
            ops::CHECK_VERSION,
            "Report the agent version",
            validate_online_idle,
            secs(60),
            secs(30),
            &[Agent],
        ),
        agent_op(
            ops::BUMP_FLAKE,
            "Update flake inputs and commit the lock",
            validate_online_idle,
            mins(30),
            mins(10),
            &[Lock],
        ),
        agent_op(
            ops::FORCE_REBUILD,
            "Rebuild the system from scratch",
            validate_online_idle,
            mins(60),
            mins(20),
            &[System],
        ),
        dashboard_op(ops::MERGE_PR, "Merge the open configuration PR", validate_always),
        dashboard_op(ops::SET_COLOR, "Set the host theme color", validate_always),
        dashboard_op(ops::REMOVE, "Remove an offline host", validate_remove),
    ]
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
