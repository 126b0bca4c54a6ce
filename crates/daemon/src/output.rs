// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-command output files.
//!
//! Each command gets `outputs/{command_id}.log`; once the cap is hit a
//! truncation marker is written and further lines are dropped.

use fleet_core::CommandId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

/// Per-command output cap (1 MB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

const TRUNCATION_MARKER: &str = "[output truncated]";

pub struct OutputStore {
    dir: PathBuf,
    /// Cached sizes so append does not stat on every line. u64::MAX marks a
    /// file that has already been truncated.
    sizes: Mutex<HashMap<CommandId, u64>>,
}

impl OutputStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, sizes: Mutex::new(HashMap::new()) }
    }

    pub fn path(&self, id: &CommandId) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    /// Append one line; silently drops once the cap is reached.
    pub fn append(&self, id: &CommandId, line: &str) -> std::io::Result<()> {
        let size = {
            let sizes = self.sizes.lock();
            sizes.get(id).copied()
        };
        let size = match size {
            Some(size) => size,
            None => self.stat(id),
        };

        if size == u64::MAX {
            return Ok(());
        }

        let written = line.len() as u64 + 1;
        if size + written > MAX_OUTPUT_BYTES {
            self.write_line(id, TRUNCATION_MARKER)?;
            self.sizes.lock().insert(id.clone(), u64::MAX);
            return Ok(());
        }

        self.write_line(id, line)?;
        self.sizes.lock().insert(id.clone(), size + written);
        Ok(())
    }

    /// Forget cached state for a finished command.
    pub fn release(&self, id: &CommandId) {
        self.sizes.lock().remove(id);
    }

    fn stat(&self, id: &CommandId) -> u64 {
        std::fs::metadata(self.path(id)).map(|m| m.len()).unwrap_or(0)
    }

    fn write_line(&self, id: &CommandId, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path(id).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(id))?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
