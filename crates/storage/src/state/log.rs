// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit trail and remote-version event handlers.

use super::{MaterializedState, EVENT_LOG_CAP};
use fleet_core::{Event, RemoteState, RemoteVersion};

/// How far back to look when deduplicating a double-applied entry. Double
/// application only happens within the immediate-apply / loop-drain window,
/// so a short tail scan is enough.
const DEDUPE_WINDOW: usize = 128;

pub(super) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::Logged { entry } => {
            let duplicate =
                state.events.iter().rev().take(DEDUPE_WINDOW).any(|e| e.id == entry.id);
            if duplicate {
                return;
            }
            state.events.push_back(entry.clone());
            while state.events.len() > EVENT_LOG_CAP {
                state.events.pop_front();
            }
        }
        Event::RemoteVersionFetched { git_commit, lock_hash, at_ms } => {
            state.remote = RemoteState::Available {
                version: RemoteVersion {
                    git_commit: git_commit.clone(),
                    lock_hash: lock_hash.clone(),
                    fetched_at_ms: *at_ms,
                },
            };
        }
        Event::RemoteVersionFailed { error, at_ms } => {
            state.remote = RemoteState::Error { message: error.clone(), at_ms: *at_ms };
        }
        _ => {}
    }
}
