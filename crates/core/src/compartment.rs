// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived per-host status compartments shown in the browser.
//!
//! Five compartments per host: Agent, Git, Lock, System, Tests. Each carries
//! a status and a human message. The evaluator in fleet-engine derives them;
//! these types only define the vocabulary and the severity ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single compartment.
///
/// `Working` is a lifecycle overlay set while the corresponding op executes;
/// the severity ordering used for the "never greener than inputs" rule only
/// ranks the four steady states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompartmentStatus {
    Ok,
    Outdated,
    Working,
    Error,
    Unknown,
}

impl CompartmentStatus {
    /// Severity rank: ok > outdated > error > unknown.
    ///
    /// `Working` ranks with `Outdated` so an in-flight op can never make a
    /// derived compartment look healthier than its inputs.
    pub fn rank(self) -> u8 {
        match self {
            Self::Ok => 3,
            Self::Outdated | Self::Working => 2,
            Self::Error => 1,
            Self::Unknown => 0,
        }
    }

    /// The less healthy of two statuses.
    pub fn min(self, other: Self) -> Self {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for CompartmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Outdated => "outdated",
            Self::Working => "working",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A compartment status with its human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compartment {
    pub status: CompartmentStatus,
    pub message: String,
}

impl Compartment {
    pub fn new(status: CompartmentStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(CompartmentStatus::Ok, message)
    }

    pub fn outdated(message: impl Into<String>) -> Self {
        Self::new(CompartmentStatus::Outdated, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(CompartmentStatus::Error, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CompartmentStatus::Unknown, message)
    }

    pub fn working(message: impl Into<String>) -> Self {
        Self::new(CompartmentStatus::Working, message)
    }
}

/// The five derived compartments for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compartments {
    pub agent: Compartment,
    pub git: Compartment,
    pub lock: Compartment,
    pub system: Compartment,
    pub tests: Compartment,
}

impl Compartments {
    /// Worst steady-state status across all five compartments.
    ///
    /// Used as the host's summary `update_status` in browser payloads.
    pub fn overall(&self) -> CompartmentStatus {
        [&self.agent, &self.git, &self.lock, &self.system, &self.tests]
            .into_iter()
            .map(|c| c.status)
            .fold(CompartmentStatus::Ok, CompartmentStatus::min)
    }
}

#[cfg(test)]
#[path = "compartment_tests.rs"]
mod tests;
