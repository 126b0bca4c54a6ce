// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named pipeline registry: op-id sequences dispatchable by name.

use fleet_core::op::ops;
use std::collections::HashMap;

/// Immutable catalog of named op sequences.
pub struct PipelineRegistry {
    pipelines: HashMap<&'static str, &'static [&'static str]>,
}

/// Full deploy: pull the commit, switch the system, run the tests.
const DEPLOY: &[&str] = &[ops::PULL, ops::SWITCH, ops::TEST];
/// Deploy preceded by merging the open configuration PR.
const MERGE_DEPLOY: &[&str] = &[ops::MERGE_PR, ops::PULL, ops::SWITCH, ops::TEST];
/// Cheap probe round to re-derive all compartments.
const VERIFY: &[&str] = &[ops::REFRESH_GIT, ops::REFRESH_LOCK, ops::REFRESH_SYSTEM];

impl PipelineRegistry {
    pub fn builtin() -> Self {
        let mut pipelines = HashMap::new();
        pipelines.insert("deploy", DEPLOY);
        pipelines.insert("merge-deploy", MERGE_DEPLOY);
        pipelines.insert("verify", VERIFY);
        Self { pipelines }
    }

    pub fn get(&self, name: &str) -> Option<&'static [&'static str]> {
        self.pipelines.get(name).copied()
    }

    pub fn is_pipeline(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.pipelines.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
#[path = "pipelines_tests.rs"]
mod tests;
