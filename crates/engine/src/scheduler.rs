// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer scheduler for command watchers.
//!
//! Timers are named by string keys (`warn:{command}`, `hard:{command}`,
//! `reconnect:{command}`). A 1-second daemon loop collects fired timers and
//! hands the keys to the Lifecycle Manager. Setting an existing key re-arms
//! it from the given time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Scheduler {
    timers: HashMap<String, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer to fire `after` from `now`.
    pub fn set(&mut self, key: impl Into<String>, after: Duration, now: Instant) {
        self.timers.insert(key.into(), now + after);
    }

    pub fn cancel(&mut self, key: &str) {
        self.timers.remove(key);
    }

    /// Cancel every timer whose key starts with `prefix`.
    pub fn cancel_prefix(&mut self, prefix: &str) {
        self.timers.retain(|k, _| !k.starts_with(prefix));
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.timers.contains_key(key)
    }

    /// Remove and return all timers due at `now`, earliest first.
    pub fn fired(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, k.clone()))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.timers.remove(key);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
