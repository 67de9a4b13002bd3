//! # Interval Recorder Contract
//!
//! The sink side of the tracker. A recorder durably appends
//! [`IntervalRecord`]s to a flat sequential log and must be idempotent per
//! [`RecordKey`]: the tick loop delivers at least once, so the same record
//! may arrive again after a failure.
//!
//! Appends never rewrite earlier lines. An interval's exit is a second
//! record, not an update of its entry.

use std::collections::HashSet;

use presence_core::{Identity, IntervalRecord, RecordKey, Timestamp};
use thiserror::Error;

/// What the recorder did with a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendAck {
    /// The record was appended.
    Appended,
    /// A record with the same key was already logged; nothing was written.
    Duplicate,
}

/// Recorder failures. All are retryable from the tracker's point of view.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The sink could not durably append the record.
    #[error("append failed for {identity} entered {entry_time}: {reason}")]
    AppendFailed {
        /// Identity on the record.
        identity: Identity,
        /// Entry time on the record.
        entry_time: Timestamp,
        /// Why the append failed.
        reason: String,
    },

    /// I/O error opening or scanning the sink.
    #[error("recorder I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Existing log content could not be parsed.
    #[error("corrupt log at line {line}: {source}")]
    CorruptLog {
        /// 1-based line number.
        line: usize,
        /// The parse failure.
        source: presence_core::ValidationError,
    },
}

impl RecorderError {
    /// Build an [`RecorderError::AppendFailed`] for `record`.
    pub fn append_failed(record: &IntervalRecord, reason: impl Into<String>) -> Self {
        Self::AppendFailed {
            identity: record.identity.clone(),
            entry_time: record.entry_time,
            reason: reason.into(),
        }
    }
}

/// An append-only, idempotent interval log.
pub trait IntervalRecorder {
    /// Durably append `record`, or acknowledge it as already present.
    fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError>;
}

impl<R: IntervalRecorder + ?Sized> IntervalRecorder for &mut R {
    fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError> {
        (**self).append(record)
    }
}

impl<R: IntervalRecorder + ?Sized> IntervalRecorder for Box<R> {
    fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError> {
        (**self).append(record)
    }
}

/// In-memory recorder preserving append order.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
    records: Vec<IntervalRecord>,
    keys: HashSet<RecordKey>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All appended records, in append order.
    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    /// Number of appended records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one identity, in append order.
    pub fn records_for(&self, identity: &Identity) -> Vec<&IntervalRecord> {
        self.records
            .iter()
            .filter(|r| &r.identity == identity)
            .collect()
    }

    /// Render the log as it would appear on disk.
    pub fn to_lines(&self) -> Vec<String> {
        self.records.iter().map(IntervalRecord::to_line).collect()
    }
}

impl IntervalRecorder for MemoryRecorder {
    fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError> {
        if !self.keys.insert(record.key()) {
            return Ok(AppendAck::Duplicate);
        }
        self.records.push(record.clone());
        Ok(AppendAck::Appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, at: &str) -> IntervalRecord {
        IntervalRecord::entry(Identity::new(name).unwrap(), Timestamp::parse(at).unwrap())
    }

    #[test]
    fn duplicate_entry_is_acknowledged_not_appended() {
        let mut rec = MemoryRecorder::new();
        let r = entry("alice", "2026-01-15T12:00:00Z");
        assert_eq!(rec.append(&r).unwrap(), AppendAck::Appended);
        assert_eq!(rec.append(&r).unwrap(), AppendAck::Duplicate);
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn exit_is_a_new_line() {
        let mut rec = MemoryRecorder::new();
        let e = entry("alice", "2026-01-15T12:00:00Z");
        let x = IntervalRecord::exit(
            e.identity.clone(),
            e.entry_time,
            Timestamp::parse("2026-01-15T12:10:00Z").unwrap(),
        )
        .unwrap();
        rec.append(&e).unwrap();
        rec.append(&x).unwrap();
        assert_eq!(
            rec.to_lines(),
            vec![
                "alice,2026-01-15T12:00:00Z,".to_string(),
                "alice,2026-01-15T12:00:00Z,2026-01-15T12:10:00Z".to_string(),
            ]
        );
    }

    #[test]
    fn new_interval_with_later_entry_is_distinct() {
        let mut rec = MemoryRecorder::new();
        rec.append(&entry("alice", "2026-01-15T12:00:00Z")).unwrap();
        rec.append(&entry("alice", "2026-01-15T13:00:00Z")).unwrap();
        rec.append(&entry("bob", "2026-01-15T12:00:00Z")).unwrap();
        assert_eq!(rec.records_for(&Identity::new("alice").unwrap()).len(), 2);
    }

    #[test]
    fn recorder_works_through_mut_ref() {
        fn deliver(mut sink: impl IntervalRecorder, r: &IntervalRecord) -> AppendAck {
            sink.append(r).unwrap()
        }
        let mut rec = MemoryRecorder::new();
        let r = entry("alice", "2026-01-15T12:00:00Z");
        assert_eq!(deliver(&mut rec, &r), AppendAck::Appended);
        assert_eq!(deliver(&mut rec, &r), AppendAck::Duplicate);
    }
}
