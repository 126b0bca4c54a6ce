// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote desired-state fetcher.
//!
//! Polls the published `{git_commit, lock_hash}` endpoint on an interval and
//! records each outcome as an event, so every host's compartments are
//! re-derived and re-broadcast after a change or a failure.

use fleet_core::{Clock, Event};
use fleet_storage::{EventBus, MaterializedState};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Response shape of the remote version endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemotePayload {
    pub git_commit: String,
    pub lock_hash: String,
}

pub struct VersionFetcher<C: Clock> {
    url: Option<String>,
    interval: Duration,
    client: reqwest::Client,
    state: Arc<Mutex<MaterializedState>>,
    bus: EventBus,
    clock: C,
}

impl<C: Clock> VersionFetcher<C> {
    pub fn new(
        url: Option<String>,
        interval: Duration,
        state: Arc<Mutex<MaterializedState>>,
        bus: EventBus,
        clock: C,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { url, interval, client, state, bus, clock }
    }

    /// Poll loop. Runs until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let Some(url) = self.url.clone() else {
            warn!("no remote version URL configured, Git/Lock compartments stay degraded");
            return;
        };

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.fetch_once(&url).await;
                    self.record(outcome);
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<RemotePayload, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        response.json::<RemotePayload>().await.map_err(|e| e.to_string())
    }

    /// Record a fetch outcome as an event (applied immediately, then
    /// replayed by the engine loop which re-broadcasts host deltas).
    pub fn record(&self, outcome: Result<RemotePayload, String>) {
        let at_ms = self.clock.epoch_ms();
        let event = match outcome {
            Ok(payload) => {
                debug!(git_commit = %payload.git_commit, "remote version fetched");
                Event::RemoteVersionFetched {
                    git_commit: payload.git_commit,
                    lock_hash: payload.lock_hash,
                    at_ms,
                }
            }
            Err(error) => {
                warn!(%error, "remote version fetch failed");
                Event::RemoteVersionFailed { error, at_ms }
            }
        };
        self.state.lock().apply_event(&event);
        if let Err(e) = self.bus.send(event) {
            warn!(error = %e, "failed to persist remote version outcome");
        }
    }
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
