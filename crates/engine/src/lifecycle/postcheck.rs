// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-check policy: exit code 0 alone does not imply success.
//!
//! The check consults compartments derived from the most recent heartbeat
//! after command completion and decides the terminal status.

use crate::registry::PostCheck;
use fleet_core::{Compartments, CompartmentStatus, ErrorCode, Host};

/// What the post-check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Partial { code: ErrorCode, message: String },
    Failed { code: ErrorCode, message: String },
    /// Signals are not in yet; run again on the next heartbeat.
    Inconclusive,
}

pub struct PostCheckCtx<'a> {
    /// Host row captured at dispatch.
    pub pre: &'a Host,
    /// Current host row.
    pub host: &'a Host,
    /// Compartments derived from the current row.
    pub compartments: &'a Compartments,
}

pub fn run(check: PostCheck, ctx: &PostCheckCtx<'_>) -> Outcome {
    match check {
        PostCheck::None => Outcome::Success,
        PostCheck::Pull => check_pull(ctx),
        PostCheck::Switch => check_switch(ctx),
        PostCheck::PullSwitch => check_pull_switch(ctx),
        PostCheck::Test => check_test(ctx),
    }
}

/// pull succeeded iff the lock came back ok. A generation advance without a
/// clean lock is PARTIAL; neither is a failed goal.
fn check_pull(ctx: &PostCheckCtx<'_>) -> Outcome {
    match ctx.compartments.lock.status {
        CompartmentStatus::Ok => Outcome::Success,
        CompartmentStatus::Unknown | CompartmentStatus::Working => Outcome::Inconclusive,
        _ => {
            if ctx.host.generation != ctx.pre.generation {
                Outcome::Partial {
                    code: ErrorCode::PartialGitOnly,
                    message: "generation advanced but lock is not clean".to_string(),
                }
            } else {
                Outcome::Failed {
                    code: ErrorCode::GoalNotAchieved,
                    message: "pull finished but lock did not become ok".to_string(),
                }
            }
        }
    }
}

/// switch succeeded iff System is ok after the reconnect. An updated agent
/// that still reports an old version stays PARTIAL pending its restart.
fn check_switch(ctx: &PostCheckCtx<'_>) -> Outcome {
    match ctx.compartments.system.status {
        CompartmentStatus::Ok => Outcome::Success,
        CompartmentStatus::Unknown | CompartmentStatus::Working => Outcome::Inconclusive,
        _ => {
            let version_changed = ctx.host.agent_version != ctx.pre.agent_version;
            if version_changed
                && ctx.compartments.agent.status == CompartmentStatus::Outdated
            {
                Outcome::Partial {
                    code: ErrorCode::GoalNotAchieved,
                    message: "agent updated but restart still pending".to_string(),
                }
            } else {
                Outcome::Failed {
                    code: ErrorCode::GoalNotAchieved,
                    message: "switch finished but system did not become ok".to_string(),
                }
            }
        }
    }
}

/// pull-switch needs both Git and System green; Git alone is PARTIAL.
fn check_pull_switch(ctx: &PostCheckCtx<'_>) -> Outcome {
    let git = ctx.compartments.git.status;
    let system = ctx.compartments.system.status;

    if git == CompartmentStatus::Ok && system == CompartmentStatus::Ok {
        return Outcome::Success;
    }
    if system == CompartmentStatus::Unknown || system == CompartmentStatus::Working {
        return Outcome::Inconclusive;
    }
    if git == CompartmentStatus::Ok {
        return Outcome::Partial {
            code: ErrorCode::PartialGitOnly,
            message: "pull landed but the system switch did not take".to_string(),
        };
    }
    Outcome::Failed {
        code: ErrorCode::GoalNotAchieved,
        message: "neither checkout nor system reached the desired state".to_string(),
    }
}

fn check_test(ctx: &PostCheckCtx<'_>) -> Outcome {
    match ctx.compartments.tests.status {
        CompartmentStatus::Ok => Outcome::Success,
        CompartmentStatus::Unknown | CompartmentStatus::Working => Outcome::Inconclusive,
        CompartmentStatus::Outdated => Outcome::Partial {
            code: ErrorCode::GoalNotAchieved,
            message: ctx.compartments.tests.message.clone(),
        },
        CompartmentStatus::Error => Outcome::Failed {
            code: ErrorCode::GoalNotAchieved,
            message: ctx.compartments.tests.message.clone(),
        },
    }
}

#[cfg(test)]
#[path = "postcheck_tests.rs"]
mod tests;
