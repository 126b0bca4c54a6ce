// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleet-engine: The operation engine.
//!
//! Op and pipeline registries, the per-host single-flight Lifecycle Manager,
//! the staged Pipeline Executor, the compartment evaluator, and the remote
//! version fetcher. Transport to agents is a trait; the daemon wires the hub
//! behind it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod compartments;
pub mod fetcher;
pub mod lifecycle;
pub mod pipeline;
pub mod pipelines;
pub mod registry;
pub mod scheduler;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use compartments::Evaluator;
pub use fetcher::VersionFetcher;
pub use lifecycle::{ActiveCommand, DashboardExec, LifecycleManager, UnconfiguredMergeBackend};
pub use pipeline::PipelineExecutor;
pub use pipelines::PipelineRegistry;
pub use registry::{HostView, Op, OpRegistry};
pub use scheduler::Scheduler;
pub use transport::{AgentTransport, TransportError};
