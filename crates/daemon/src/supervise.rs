// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panic-surviving task supervision.
//!
//! Every long-lived loop runs under a supervisor: a panic is logged and the
//! loop restarts after a short pause instead of silently dying.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Spawn `factory()` and restart it whenever it panics. A clean return or
/// shutdown ends supervision.
pub fn spawn_supervised<F, Fut>(name: &'static str, shutdown: CancellationToken, factory: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let run = tokio::spawn(factory());
            match run.await {
                Ok(()) => {
                    info!(task = name, "loop exited cleanly");
                    break;
                }
                Err(e) if e.is_panic() => {
                    error!(task = name, "loop panicked, restarting");
                    tokio::select! {
                        _ = tokio::time::sleep(RESTART_DELAY) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
#[path = "supervise_tests.rs"]
mod tests;
