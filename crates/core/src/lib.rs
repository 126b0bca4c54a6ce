// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-core: Domain types for the NixFleet control plane.
//!
//! Hosts, commands, pipelines, compartments, audit entries, and the store
//! event vocabulary. No I/O lives here.

pub mod clock;
pub mod command;
pub mod compartment;
pub mod error;
pub mod event;
pub mod host;
pub mod id;
pub mod op;
pub mod pipeline;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use command::{Command, CommandError, CommandId, CommandStatus};
pub use compartment::{Compartment, CompartmentStatus, Compartments};
pub use error::{ErrorCode, ValidationError};
pub use event::{Event, LogEntry, LogLevel};
pub use host::{AgentReported, Freshness, Host, HostId, HostMetrics, HostStatus, HostType};
pub use id::{new_id, short};
pub use op::OpExecutor;
pub use pipeline::{Pipeline, PipelineId, PipelineStatus};
pub use version::{RemoteState, RemoteVersion};
