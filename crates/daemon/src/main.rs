// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NixFleet daemon (fleetd)
//!
//! Control-plane process: owns the event loop, the hub, and every
//! long-lived watcher task.
//!
//! Architecture:
//! - Hub loop: actor owning agent/browser connection maps, version counter
//! - Engine loop: main task draining the WAL, emitting browser deltas
//! - Watchers: timer loop (via engine loop tick), stale cleanup, version
//!   fetcher, sync beacon, WAL flush, checkpoint

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod app;
mod changes;
mod dispatch;
mod env;
mod http;
mod hub;
mod merge;
mod output;
mod session;
mod stale;
mod startup;
mod supervise;
mod sync;

#[cfg(test)]
mod test_app;

use app::App;
use env::Config;
use fleet_core::{Clock, Event, SystemClock};
use fleet_engine::lifecycle::{DashboardExec, UnconfiguredMergeBackend};
use fleet_engine::{
    Evaluator, LifecycleManager, OpRegistry, PipelineExecutor, PipelineRegistry, Scheduler,
    VersionFetcher,
};
use fleet_storage::{EventBus, MaterializedState, Snapshot, Wal};
use hub::Hub;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync::{Broadcaster, StateView};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DASHBOARD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("fleetd {DASHBOARD_VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("fleetd {DASHBOARD_VERSION}");
                println!("NixFleet control-plane daemon");
                println!();
                println!("USAGE:");
                println!("    fleetd");
                println!();
                println!("Configuration comes from FLEET_* environment variables;");
                println!("see the repository README for the full list.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: fleetd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    rotate_log_if_needed(&config.log_path());
    let _log_guard = setup_logging(&config)?;

    info!(version = DASHBOARD_VERSION, "starting fleetd");

    let booted = match startup::startup(&config) {
        Ok(booted) => booted,
        Err(startup::StartupError::LockFailed) => {
            eprintln!("fleetd is already running for this state dir");
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start: {e}");
            return Err(e.into());
        }
    };
    let startup::StartupResult { state, bus, mut reader, lock_file: _lock_file } = booted;

    let shutdown = CancellationToken::new();
    let clock = SystemClock;

    // Engine components
    let registry = Arc::new(OpRegistry::builtin());
    let evaluator = Arc::new(Evaluator::new(
        Arc::clone(&registry),
        DASHBOARD_VERSION,
        config.remote_ttl.as_millis() as u64,
    ));
    let scheduler = Arc::new(Mutex::new(Scheduler::new()));
    let view = Arc::new(StateView {
        state: Arc::clone(&state),
        evaluator: Arc::clone(&evaluator),
        registry: Arc::clone(&registry),
        clock,
        dashboard_version: DASHBOARD_VERSION.to_string(),
    });

    let (hub, hub_handle, hub_transport) = Hub::new(Arc::clone(&view), bus.clone());

    let merge_backend: Arc<dyn DashboardExec> = match std::env::var("FLEET_MERGE_URL") {
        Ok(url) if !url.is_empty() => Arc::new(merge::HttpMergeBackend::new(url)),
        _ => Arc::new(UnconfiguredMergeBackend),
    };

    let lifecycle = Arc::new(
        LifecycleManager::new(
            Arc::clone(&state),
            bus.clone(),
            Arc::clone(&registry),
            Arc::clone(&evaluator),
            hub_transport,
            Arc::clone(&scheduler),
            clock,
            merge_backend,
        )
        .with_output_dir(config.output_dir()),
    );
    let pipelines = Arc::new(PipelineExecutor::new(
        Arc::new(PipelineRegistry::builtin()),
        Arc::clone(&state),
        bus.clone(),
        clock,
    ));

    let broadcaster = Broadcaster::new();
    let app = Arc::new(App::new(
        config.clone(),
        Arc::clone(&state),
        bus.clone(),
        Arc::clone(&view),
        Arc::clone(&lifecycle),
        Arc::clone(&pipelines),
        hub_handle.clone(),
        broadcaster.clone(),
    ));

    // Hub loop
    {
        let shutdown = shutdown.clone();
        tokio::spawn(hub.run(shutdown));
    }
    hub::spawn_broadcast_forwarder(broadcaster.clone(), hub_handle.clone(), shutdown.clone());

    // Recover non-terminal commands and stalled pipelines now that the
    // transport is live (sends to still-disconnected agents fail cleanly).
    lifecycle.recover();
    pipelines.resume(&lifecycle).await;

    // HTTP + websocket surface
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");
    {
        let router = http::router(Arc::clone(&app));
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "http server exited");
            }
        });
    }

    // Version fetcher
    {
        let fetcher = VersionFetcher::new(
            config.remote_version_url.clone(),
            config.remote_fetch_interval,
            Arc::clone(&state),
            bus.clone(),
            clock,
        );
        let shutdown = shutdown.clone();
        tokio::spawn(fetcher.run(shutdown));
    }

    // Stale cleanup
    {
        let app = Arc::clone(&app);
        let shutdown_outer = shutdown.clone();
        supervise::spawn_supervised("stale-cleanup", shutdown.clone(), move || {
            stale::run(Arc::clone(&app), shutdown_outer.clone())
        });
    }

    // Sync beacon
    {
        let hub_handle = hub_handle.clone();
        let interval = config.sync_beacon_interval;
        let shutdown_outer = shutdown.clone();
        supervise::spawn_supervised("sync-beacon", shutdown.clone(), move || {
            let hub_handle = hub_handle.clone();
            let shutdown = shutdown_outer.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => hub_handle.send(hub::HubCmd::Beacon).await,
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        });
    }

    // WAL group-commit flush
    spawn_flush_task(bus.clone(), shutdown.clone());

    // Periodic checkpoint + WAL truncation
    spawn_checkpoint(
        Arc::clone(&state),
        reader.wal(),
        config.snapshot_path(),
        shutdown.clone(),
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut timer_check = tokio::time::interval(Duration::from_secs(1));

    info!("fleetd ready");

    // Engine loop: drains the WAL, advances pipelines, emits deltas.
    loop {
        tokio::select! {
            result = reader.recv() => {
                match result {
                    Ok(Some(entry)) => {
                        let seq = entry.seq;
                        state.lock().apply_event(&entry.event);

                        let deltas = changes::translate(&view, &entry.event);
                        broadcaster.publish_all(deltas);

                        if let Event::CommandFinished { id, .. } = &entry.event {
                            let row = state.lock().command(id).cloned();
                            if let Some(row) = row {
                                app.output.release(&row.id);
                                pipelines.on_command_finished(&row, &lifecycle).await;
                            }
                        }
                        reader.mark_processed(seq);
                    }
                    Ok(None) => {
                        info!("event bus closed, shutting down");
                        break;
                    }
                    Err(e) => error!(error = %e, "error reading WAL"),
                }
            }

            _ = timer_check.tick() => {
                let fired = scheduler.lock().fired(clock.now());
                for key in fired {
                    lifecycle.handle_timer(&key);
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = bus.flush() {
        error!(error = %e, "final WAL flush failed");
    }
    info!("fleetd stopped");
    Ok(())
}

/// Flush interval for group commit (~10 ms durability window).
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

fn spawn_flush_task(bus: EventBus, shutdown: CancellationToken) {
    supervise::spawn_supervised("wal-flush", shutdown.clone(), move || {
        let bus = bus.clone();
        let shutdown = shutdown.clone();
        async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if bus.needs_flush() {
                            if let Err(e) = bus.flush() {
                                error!(error = %e, "WAL flush failed");
                            }
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    });
}

/// Checkpoint interval.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshot the state and truncate the WAL. Truncation only happens after
/// the snapshot is durably renamed into place.
fn spawn_checkpoint(
    state: Arc<Mutex<MaterializedState>>,
    wal: Arc<Mutex<Wal>>,
    snapshot_path: PathBuf,
    shutdown: CancellationToken,
) {
    supervise::spawn_supervised("checkpoint", shutdown.clone(), move || {
        let state = Arc::clone(&state);
        let wal = Arc::clone(&wal);
        let snapshot_path = snapshot_path.clone();
        let shutdown = shutdown.clone();
        async move {
            let mut ticker = tokio::time::interval(CHECKPOINT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (snapshot_state, seq) = {
                            let state = state.lock();
                            let wal = wal.lock();
                            (state.clone(), wal.processed_seq())
                        };
                        if seq == 0 {
                            continue;
                        }

                        let snapshot = Snapshot::new(seq, snapshot_state);
                        let path = snapshot_path.clone();
                        let saved = tokio::task::spawn_blocking(move || snapshot.save(&path)).await;
                        match saved {
                            Ok(Ok(())) => {
                                if let Err(e) = wal.lock().truncate_before(seq) {
                                    tracing::warn!(error = %e, "WAL truncation failed");
                                } else {
                                    tracing::debug!(seq, "checkpoint complete");
                                }
                            }
                            Ok(Err(e)) => tracing::warn!(error = %e, "checkpoint failed"),
                            Err(e) => tracing::warn!(error = %e, "checkpoint task failed"),
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
/// Rotated log files kept.
const MAX_ROTATED_LOGS: u32 = 3;

/// Shift `fleetd.log` → `.1` → `.2` → `.3` when the live log grows too big.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{log_str}.{i}"), format!("{log_str}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::never(&config.log_dir, "fleetd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}
