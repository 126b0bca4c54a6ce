// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration from the environment. Secrets never live in files.

use crate::startup::StartupError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub listen_addr: String,
    /// Bearer token agents must present. Unset means no agent can connect.
    pub agent_token: Option<String>,
    /// Dashboard login password. Unset means no browser can log in.
    pub session_secret: Option<String>,
    pub remote_version_url: Option<String>,
    pub totp_secret: Option<String>,
    pub remote_fetch_interval: Duration,
    pub remote_ttl: Duration,
    pub stale_check_interval: Duration,
    pub sync_beacon_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self, StartupError> {
        let state_dir = state_dir()?;
        let log_dir = match std::env::var("FLEET_LOG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => state_dir.join("logs"),
        };
        Ok(Self {
            log_dir,
            listen_addr: std::env::var("FLEET_LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8337".to_string()),
            agent_token: non_empty("FLEET_AGENT_TOKEN"),
            session_secret: non_empty("FLEET_SESSION_SECRET"),
            remote_version_url: non_empty("FLEET_REMOTE_VERSION_URL"),
            totp_secret: non_empty("FLEET_TOTP_SECRET"),
            remote_fetch_interval: duration_var("FLEET_REMOTE_FETCH_SECS", 30),
            remote_ttl: duration_var("FLEET_REMOTE_TTL_SECS", 120),
            stale_check_interval: duration_var("FLEET_STALE_CHECK_SECS", 30),
            sync_beacon_interval: duration_var("FLEET_SYNC_BEACON_SECS", 30),
            state_dir,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("events.wal")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("state.snapshot")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("fleetd.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join("fleetd.log")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.state_dir.join("outputs")
    }
}

/// Resolve state directory: FLEET_STATE_DIR > XDG_STATE_HOME/nixfleet >
/// ~/.local/state/nixfleet
fn state_dir() -> Result<PathBuf, StartupError> {
    if let Ok(dir) = std::env::var("FLEET_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("nixfleet"));
    }
    let home = std::env::var("HOME").map_err(|_| StartupError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/nixfleet"))
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn duration_var(name: &str, default_secs: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default_secs))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
