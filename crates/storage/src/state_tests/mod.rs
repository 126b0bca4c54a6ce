// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod commands;
mod hosts;
mod log;
mod pipelines;

use super::MaterializedState;
use fleet_core::test_support;
use fleet_core::{Event, HostId};

/// State with one registered online host.
pub(crate) fn with_host(id: &str) -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::HostRegistered { host: test_support::host(id) });
    state
}

pub(crate) fn hid(id: &str) -> HostId {
    HostId::new(id)
}
