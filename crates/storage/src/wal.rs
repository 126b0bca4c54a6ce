// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event write-ahead log with group commit.
//!
//! Events are durable before they are processed, enabling crash recovery via
//! snapshot + replay. Writes are batched (~10 ms window) and fsynced once
//! per flush. Each entry is one line: `{"seq":N,"event":{...}}`.
//!
//! Two backings share the API: a file (production) and an in-process buffer
//! (the `:memory:` mode used by tests).

use fleet_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit.
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum buffered entries before a flush is forced.
const FLUSH_THRESHOLD: usize = 100;

/// Errors that can occur in WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordRef<'a> {
    seq: u64,
    event: &'a Event,
}

#[derive(Deserialize)]
struct Record {
    seq: u64,
    event: Event,
}

/// A WAL entry with its sequence number.
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

enum Backing {
    File {
        file: File,
        read_file: File,
        path: PathBuf,
        /// Byte offset of the first unprocessed entry.
        read_offset: u64,
    },
    Memory {
        lines: Vec<String>,
        /// Index of the first unprocessed line.
        read_index: usize,
    },
}

/// Durable event log with group commit.
///
/// Tracks both the write sequence (highest seq appended) and the processed
/// sequence (highest seq the engine loop has consumed). The processed seq is
/// persisted via snapshots, not by the WAL itself.
pub struct Wal {
    backing: Backing,
    write_seq: u64,
    processed_seq: u64,
    write_buffer: Vec<String>,
    last_flush: Instant,
}

impl Wal {
    /// Open or create a WAL file.
    ///
    /// `processed_seq` comes from the snapshot (0 without one). A corrupt
    /// tail is rotated to `.bak`, keeping the valid prefix.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let mut scan = scan_file(&file, processed_seq)?;

        if scan.corrupt {
            let valid = scan.valid_lines;
            drop(file);

            let bak = crate::snapshot::rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak.display(),
                kept = valid.len(),
                "corrupt WAL tail, rotating to .bak and keeping valid prefix",
            );
            std::fs::rename(path, &bak)?;

            {
                let mut fresh = File::create(path)?;
                for line in &valid {
                    fresh.write_all(line.as_bytes())?;
                    fresh.write_all(b"\n")?;
                }
                fresh.sync_all()?;
            }

            file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
            scan = scan_file(&file, processed_seq)?;
        }

        let read_file = file.try_clone()?;
        Ok(Self {
            backing: Backing::File {
                file,
                read_file,
                path: path.to_owned(),
                read_offset: scan.read_offset,
            },
            write_seq: scan.max_seq,
            processed_seq,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// A WAL that never touches disk. Same semantics, used by tests.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory { lines: Vec::new(), read_index: 0 },
            write_seq: 0,
            processed_seq: 0,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Append an event to the write buffer and return its sequence number.
    ///
    /// Not durable until [`Wal::flush`].
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let line = serde_json::to_string(&RecordRef { seq, event })?;
        self.write_buffer.push(line);
        Ok(seq)
    }

    /// Whether the group-commit window has elapsed or the buffer is full.
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Flush all buffered entries with a single fsync. The durability point.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        match &mut self.backing {
            Backing::File { file, .. } => {
                for line in self.write_buffer.drain(..) {
                    file.write_all(line.as_bytes())?;
                    file.write_all(b"\n")?;
                }
                file.sync_all()?;
            }
            Backing::Memory { lines, .. } => {
                lines.append(&mut self.write_buffer);
            }
        }
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Next unprocessed entry, or `None` when caught up.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        self.flush()?;

        match &mut self.backing {
            Backing::File { read_file, read_offset, .. } => {
                let mut reader = BufReader::new(&*read_file);
                reader.seek(SeekFrom::Start(*read_offset))?;

                let mut line = String::new();
                let n = match reader.read_line(&mut line) {
                    Ok(0) => return Ok(None),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    *read_offset += n as u64;
                    return Ok(None);
                }

                match serde_json::from_str::<Record>(trimmed) {
                    Ok(record) => {
                        *read_offset += n as u64;
                        Ok(Some(WalEntry { seq: record.seq, event: record.event }))
                    }
                    Err(e) => {
                        warn!(offset = *read_offset, error = %e, "corrupt WAL entry, skipping");
                        *read_offset += n as u64;
                        Ok(None)
                    }
                }
            }
            Backing::Memory { lines, read_index } => {
                let Some(line) = lines.get(*read_index) else {
                    return Ok(None);
                };
                let record: Record = serde_json::from_str(line)?;
                *read_index += 1;
                Ok(Some(WalEntry { seq: record.seq, event: record.event }))
            }
        }
    }

    /// Mark an entry as processed. Persisted via snapshots.
    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = seq;
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Drop entries below `seq` after a checkpoint made them redundant.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), WalError> {
        self.flush()?;

        let processed_seq = self.processed_seq;
        match &mut self.backing {
            Backing::File { file, read_file, path, read_offset } => {
                let kept = read_lines_from(file, |record_seq| record_seq >= seq)?;

                let tmp_path = path.with_extension("tmp");
                let mut new_offset = 0u64;
                let mut offset_found = false;
                {
                    let mut tmp = File::create(&tmp_path)?;
                    let mut pos = 0u64;
                    for (entry_seq, line) in &kept {
                        if *entry_seq > processed_seq && !offset_found {
                            new_offset = pos;
                            offset_found = true;
                        }
                        tmp.write_all(line.as_bytes())?;
                        tmp.write_all(b"\n")?;
                        pos += line.len() as u64 + 1;
                    }
                    if !offset_found {
                        new_offset = pos;
                    }
                    tmp.sync_all()?;
                }

                std::fs::rename(&tmp_path, &*path)?;
                *file = OpenOptions::new().create(true).read(true).append(true).open(&*path)?;
                *read_file = file.try_clone()?;
                *read_offset = new_offset;
            }
            Backing::Memory { lines, read_index } => {
                let mut kept = Vec::with_capacity(lines.len());
                let mut new_index = 0;
                for line in lines.drain(..) {
                    let Ok(record) = serde_json::from_str::<Record>(&line) else { continue };
                    if record.seq < seq {
                        continue;
                    }
                    if record.seq <= processed_seq {
                        new_index += 1;
                    }
                    kept.push(line);
                }
                *lines = kept;
                *read_index = new_index;
            }
        }
        Ok(())
    }

    /// All entries after `seq`, in order. Used for recovery replay.
    pub fn entries_after(&mut self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        self.flush()?;

        let lines: Vec<(u64, String)> = match &self.backing {
            Backing::File { file, .. } => read_lines_from(file, |record_seq| record_seq > seq)?,
            Backing::Memory { lines, .. } => lines
                .iter()
                .filter_map(|l| {
                    let record: Record = serde_json::from_str(l).ok()?;
                    (record.seq > seq).then(|| (record.seq, l.clone()))
                })
                .collect(),
        };

        let mut entries = Vec::with_capacity(lines.len());
        for (_, line) in lines {
            let record: Record = serde_json::from_str(&line)?;
            entries.push(WalEntry { seq: record.seq, event: record.event });
        }
        Ok(entries)
    }
}

struct ScanResult {
    max_seq: u64,
    read_offset: u64,
    corrupt: bool,
    valid_lines: Vec<String>,
}

/// Scan a WAL file for the max seq, the read offset for `processed_seq`,
/// and the valid line prefix in case the tail is corrupt.
fn scan_file(file: &File, processed_seq: u64) -> Result<ScanResult, WalError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut result =
        ScanResult { max_seq: 0, read_offset: 0, corrupt: false, valid_lines: Vec::new() };
    let mut offset = 0u64;
    let mut offset_found = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                result.corrupt = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            offset += n as u64;
            continue;
        }

        let record: Record = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(_) => {
                result.corrupt = true;
                break;
            }
        };

        result.max_seq = result.max_seq.max(record.seq);
        if record.seq > processed_seq && !offset_found {
            result.read_offset = offset;
            offset_found = true;
        }
        result.valid_lines.push(trimmed.to_string());
        offset += n as u64;
    }

    if !offset_found {
        result.read_offset = offset;
    }
    Ok(result)
}

/// Read all parseable lines whose seq passes the filter, stopping at the
/// first corrupt entry.
fn read_lines_from(
    file: &File,
    keep: impl Fn(u64) -> bool,
) -> Result<Vec<(u64, String)>, WalError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut kept = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e.into()),
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Record = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "corrupt WAL entry, stopping scan");
                break;
            }
        };
        if keep(record.seq) {
            kept.push((record.seq, trimmed.to_string()));
        }
    }
    Ok(kept)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
