// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale-host cleanup loop.
//!
//! Hosts whose heartbeats stopped are marked offline once their staleness
//! window elapses; orphaned `pending_command` markers are cleared only when
//! the Lifecycle Manager confirms no command is actually active.

use crate::app::App;
use fleet_core::{Event, Host, HostId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Staleness multiplier over the host's own heartbeat interval.
const STALE_MULTIPLIER: u64 = 3;
/// Minimum staleness window regardless of heartbeat interval.
const STALE_FLOOR: Duration = Duration::from_secs(90);

fn stale_window(host: &Host) -> u64 {
    let by_interval = host.heartbeat_interval_secs * STALE_MULTIPLIER * 1000;
    by_interval.max(STALE_FLOOR.as_millis() as u64)
}

/// One cleanup pass over all hosts.
pub fn sweep(app: &App) {
    let now_ms = app.view.clock_ms();

    let (gone_stale, orphaned): (Vec<HostId>, Vec<HostId>) = {
        let state = app.state.lock();
        let gone_stale = state
            .hosts
            .values()
            .filter(|h| h.is_online() && now_ms.saturating_sub(h.last_seen_ms) > stale_window(h))
            .map(|h| h.id.clone())
            .collect();
        let orphaned = state
            .hosts
            .values()
            .filter(|h| !h.is_online() && h.pending_command.is_some())
            .filter(|h| now_ms.saturating_sub(h.last_seen_ms) > stale_window(h))
            .map(|h| h.id.clone())
            .collect();
        (gone_stale, orphaned)
    };

    for id in gone_stale {
        info!(host = %id, "heartbeats stopped, marking offline");
        app.record(Event::HostOffline { id, at_ms: now_ms });
    }
    for id in orphaned {
        // Clears only if the Lifecycle Manager reports no active command.
        app.lifecycle.clear_stale_pending(&id);
    }
}

pub async fn run(app: Arc<App>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(app.config.stale_check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(&app),
            _ = shutdown.cancelled() => break,
        }
    }
}

#[cfg(test)]
#[path = "stale_tests.rs"]
mod tests;
