// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary freshness verification after a switch.
//!
//! Three independent signals, compared pairwise between the pre-switch
//! capture and the post-reconnect report: source commit (compiled in), Nix
//! store path, binary hash.

use fleet_core::Freshness;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The binary demonstrably changed.
    Fresh,
    /// Source commit moved but store path and hash did not, which points at
    /// a build cache serving the old binary.
    Suspicious,
    /// Nothing changed: the agent is still running the old binary.
    StaleBinary,
    /// Not enough signal to judge. Treated as success, logged at warn.
    Unknown,
}

pub fn verify(pre: Option<&Freshness>, post: Option<&Freshness>) -> Verdict {
    let (Some(pre), Some(post)) = (pre, post) else {
        return Verdict::Unknown;
    };
    if pre.is_empty() || post.is_empty() {
        return Verdict::Unknown;
    }

    let changed = |a: &Option<String>, b: &Option<String>| match (a, b) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    };

    let store_changed = changed(&pre.store_path, &post.store_path);
    let hash_changed = changed(&pre.binary_hash, &post.binary_hash);
    let commit_changed = changed(&pre.source_commit, &post.source_commit);

    if store_changed == Some(true) || hash_changed == Some(true) {
        return Verdict::Fresh;
    }

    // Neither store path nor hash moved. If we could not compare either
    // signal at all, refuse to judge.
    if store_changed.is_none() && hash_changed.is_none() {
        return Verdict::Unknown;
    }

    match commit_changed {
        Some(true) => Verdict::Suspicious,
        Some(false) => Verdict::StaleBinary,
        None => Verdict::StaleBinary,
    }
}

#[cfg(test)]
#[path = "freshness_tests.rs"]
mod tests;
