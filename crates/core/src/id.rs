// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Id generation and display helpers.

use uuid::Uuid;

/// Fresh random id for commands, pipelines, audit entries, and hosts.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// First `n` characters of an id, for log lines and UI labels.
pub fn short(id: &str, n: usize) -> &str {
    match id.char_indices().nth(n) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
