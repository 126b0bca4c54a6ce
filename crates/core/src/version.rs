// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote desired state: the published `{git_commit, lock_hash}` pair.

use serde::{Deserialize, Serialize};

/// A successfully fetched remote version, with its fetch time for TTL checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub git_commit: String,
    pub lock_hash: String,
    pub fetched_at_ms: u64,
}

/// Cache state of the remote desired-state fetcher.
///
/// `Unknown` only exists before the first fetch attempt. After that, fetch
/// failure or TTL expiry degrades to `Error`, never back to `Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteState {
    #[default]
    Unknown,
    Available {
        version: RemoteVersion,
    },
    Error {
        message: String,
        at_ms: u64,
    },
}

/// The remote state after TTL enforcement, as consumed by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteView<'a> {
    Unknown,
    Ok(&'a RemoteVersion),
    Error(String),
}

impl RemoteState {
    /// Apply the TTL: a stale `Available` is an error, not a pass.
    pub fn view(&self, now_ms: u64, ttl_ms: u64) -> RemoteView<'_> {
        match self {
            Self::Unknown => RemoteView::Unknown,
            Self::Available { version } => {
                if now_ms.saturating_sub(version.fetched_at_ms) > ttl_ms {
                    RemoteView::Error("remote version expired".to_string())
                } else {
                    RemoteView::Ok(version)
                }
            }
            Self::Error { message, .. } => RemoteView::Error(message.clone()),
        }
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
