//! # Flat CSV Attendance Log
//!
//! File-backed [`IntervalRecorder`]. One CSV row per line, no header:
//!
//! ```text
//! identity,entry_time,exit_time_or_empty
//! ```
//!
//! Rows are encoded and decoded with the `csv` crate through
//! [`IntervalRecord::to_line`] and [`IntervalRecord::parse_line`].
//!
//! ## Durability and atomicity
//!
//! Each record is written as one complete line with a single `write_all`,
//! then flushed and `fsync`ed (`sync_data`) before the append is
//! acknowledged. If the write fails part-way the file is truncated back to
//! its previous length, so a retry never lands after a torn fragment.
//!
//! ## Idempotency across restarts
//!
//! On open, every existing line is parsed and its [`RecordKey`] remembered.
//! Redelivering a record already in the file is acknowledged as
//! [`AppendAck::Duplicate`] without writing. A torn final line left by a
//! crash (no terminator, unparseable) is cut off; any other unparseable line
//! is reported as [`RecorderError::CorruptLog`].

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use presence_core::{IntervalRecord, RecordKey};

use crate::recorder::{AppendAck, IntervalRecorder, RecorderError};

/// Append-only attendance log on disk.
#[derive(Debug)]
pub struct CsvIntervalLog {
    path: PathBuf,
    file: File,
    keys: HashSet<RecordKey>,
    /// The last existing line had no terminator.
    needs_newline: bool,
}

/// Result of scanning existing log content.
struct Scan {
    keys: HashSet<RecordKey>,
    valid_len: usize,
    needs_newline: bool,
}

impl CsvIntervalLog {
    /// Open (creating if absent) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let scan = scan(&content)?;

        if scan.valid_len < content.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = content.len() - scan.valid_len,
                "truncating torn final line in attendance log"
            );
            file.set_len(scan.valid_len as u64)?;
        }

        tracing::debug!(path = %path.display(), records = scan.keys.len(), "opened attendance log");
        Ok(Self {
            path,
            file,
            keys: scan.keys,
            needs_newline: scan.needs_newline,
        })
    }

    /// Location of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct records in the log.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether a record with `key` is already logged.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let len_before = self.file.metadata()?.len();
        let result = write_durably(&mut self.file, line.as_bytes());
        if result.is_err() {
            if let Err(e) = self.file.set_len(len_before) {
                tracing::error!(path = %self.path.display(), error = %e, "failed to roll back partial append");
            }
        }
        result
    }
}

impl IntervalRecorder for CsvIntervalLog {
    fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError> {
        let key = record.key();
        if self.keys.contains(&key) {
            tracing::debug!(record = %record, "record already logged");
            return Ok(AppendAck::Duplicate);
        }

        let mut line = String::new();
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');

        self.write_line(&line)
            .map_err(|e| RecorderError::append_failed(record, e.to_string()))?;
        self.needs_newline = false;
        self.keys.insert(key);
        Ok(AppendAck::Appended)
    }
}

fn write_durably(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_data()
}

fn scan(content: &str) -> Result<Scan, RecorderError> {
    let mut keys = HashSet::new();
    let mut offset = 0;
    let mut needs_newline = false;

    for (index, chunk) in content.split_inclusive('\n').enumerate() {
        let terminated = chunk.ends_with('\n');
        let text = chunk.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            offset += chunk.len();
            continue;
        }
        match IntervalRecord::parse_line(text) {
            Ok(record) => {
                keys.insert(record.key());
                needs_newline = !terminated;
            }
            Err(_) if !terminated => {
                // Unterminated and unparseable: a write cut short.
                return Ok(Scan {
                    keys,
                    valid_len: offset,
                    needs_newline: false,
                });
            }
            Err(source) => {
                return Err(RecorderError::CorruptLog {
                    line: index + 1,
                    source,
                });
            }
        }
        offset += chunk.len();
    }

    Ok(Scan {
        keys,
        valid_len: offset,
        needs_newline,
    })
}
