//! # Attendance Ledger
//!
//! Reconciles a flat interval log back into intervals. The log holds an
//! entry line when an interval opens and a second line when it closes, and
//! redelivery may have repeated either. The ledger collapses both into one
//! [`AttendanceInterval`] per `(identity, entry_time)`.

use std::collections::BTreeMap;
use std::path::Path;

use presence_core::{Identity, IntervalRecord, Timestamp, ValidationError};
use serde::Serialize;

use crate::recorder::RecorderError;

/// One reconciled presence interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceInterval {
    /// Who was present.
    pub identity: Identity,
    /// When they arrived.
    pub entry_time: Timestamp,
    /// When they left; `None` while still present.
    pub exit_time: Option<Timestamp>,
}

impl AttendanceInterval {
    /// Length in seconds, if closed.
    pub fn duration_secs(&self) -> Option<i64> {
        self.exit_time.map(|exit| self.entry_time.seconds_until(&exit))
    }

    /// Whether the interval is still open.
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }
}

/// Per-identity summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityTotal {
    /// The identity.
    pub identity: Identity,
    /// Number of intervals, open or closed.
    pub intervals: usize,
    /// Seconds spent in closed intervals.
    pub closed_seconds: i64,
}

/// Reconciled view of an interval log.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLedger {
    // Keyed (identity, entry_time); value is the exit time once seen.
    entries: BTreeMap<(Identity, Timestamp), Option<Timestamp>>,
}

impl AttendanceLedger {
    /// Fold records in log order.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = IntervalRecord>,
    {
        let mut ledger = Self::default();
        for record in records {
            ledger.apply(record);
        }
        ledger
    }

    fn apply(&mut self, record: IntervalRecord) {
        let slot = self
            .entries
            .entry((record.identity, record.entry_time))
            .or_insert(None);
        if let Some(exit) = record.exit_time {
            if slot.is_some_and(|prev| prev != exit) {
                tracing::warn!(entry_time = %record.entry_time, "conflicting exit times; keeping the first");
            } else {
                *slot = Some(exit);
            }
        }
    }

    /// All intervals, ordered by entry time then identity.
    pub fn intervals(&self) -> Vec<AttendanceInterval> {
        let mut out: Vec<AttendanceInterval> = self
            .entries
            .iter()
            .map(|((identity, entry_time), exit_time)| AttendanceInterval {
                identity: identity.clone(),
                entry_time: *entry_time,
                exit_time: *exit_time,
            })
            .collect();
        out.sort_by(|a, b| {
            a.entry_time
                .cmp(&b.entry_time)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        out
    }

    /// Intervals with no exit yet.
    pub fn open_intervals(&self) -> Vec<AttendanceInterval> {
        self.intervals().into_iter().filter(|i| i.is_open()).collect()
    }

    /// Per-identity totals, ordered by identity.
    pub fn totals(&self) -> Vec<IdentityTotal> {
        let mut totals: BTreeMap<&Identity, IdentityTotal> = BTreeMap::new();
        for ((identity, entry_time), exit_time) in &self.entries {
            let total = totals.entry(identity).or_insert_with(|| IdentityTotal {
                identity: identity.clone(),
                intervals: 0,
                closed_seconds: 0,
            });
            total.intervals += 1;
            if let Some(exit) = exit_time {
                total.closed_seconds += entry_time.seconds_until(exit);
            }
        }
        totals.into_values().collect()
    }

    /// Number of distinct intervals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log held no intervals.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse an interval log file. Blank lines are skipped.
///
/// # Errors
///
/// [`RecorderError::Io`] if the file cannot be read, or
/// [`RecorderError::CorruptLog`] naming the first malformed line (1-based).
pub fn read_csv_log(path: &Path) -> Result<Vec<IntervalRecord>, RecorderError> {
    let content = std::fs::read_to_string(path)?;
    parse_log(&content)
}

fn parse_log(content: &str) -> Result<Vec<IntervalRecord>, RecorderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| RecorderError::CorruptLog {
            line: e.position().map_or(0, |p| p.line() as usize),
            source: ValidationError::MalformedLine {
                line: String::new(),
                reason: e.to_string(),
            },
        })?;
        let line = row.position().map_or(0, |p| p.line() as usize);
        let record = IntervalRecord::from_fields(row.iter())
            .map_err(|source| RecorderError::CorruptLog { line, source })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
alice,2026-01-15T09:00:00Z,
bob,2026-01-15T09:00:10Z,
alice,2026-01-15T09:00:00Z,2026-01-15T09:30:00Z
alice,2026-01-15T09:00:00Z,

alice,2026-01-15T10:00:00Z,
carol,2026-01-15T08:00:00Z,2026-01-15T08:00:45Z
";

    fn ledger() -> AttendanceLedger {
        AttendanceLedger::from_records(parse_log(LOG).unwrap())
    }

    #[test]
    fn pairs_entries_with_exits() {
        let intervals = ledger().intervals();
        assert_eq!(intervals.len(), 4);
        assert_eq!(intervals[0].identity.as_str(), "carol");
        assert_eq!(intervals[1].identity.as_str(), "alice");
        assert_eq!(intervals[1].duration_secs(), Some(1800));
    }

    #[test]
    fn redelivered_entry_does_not_reopen() {
        let open = ledger().open_intervals();
        let names: Vec<&str> = open.iter().map(|i| i.identity.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
        assert_eq!(open[1].entry_time, Timestamp::parse("2026-01-15T10:00:00Z").unwrap());
    }

    #[test]
    fn totals_sum_closed_time_only() {
        let totals = ledger().totals();
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].identity.as_str(), "alice");
        assert_eq!(totals[0].intervals, 2);
        assert_eq!(totals[0].closed_seconds, 1800);
        assert_eq!(totals[1].closed_seconds, 0);
        assert_eq!(totals[2].closed_seconds, 45);
    }

    #[test]
    fn orphan_exit_is_still_an_interval() {
        let ledger = AttendanceLedger::from_records(
            parse_log("dave,2026-01-15T09:00:00Z,2026-01-15T09:01:00Z\n").unwrap(),
        );
        assert_eq!(ledger.len(), 1);
        assert!(ledger.open_intervals().is_empty());
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = parse_log("alice,2026-01-15T09:00:00Z,\n\ngarbage\n").unwrap_err();
        assert!(matches!(err, RecorderError::CorruptLog { line: 3, .. }));
    }

    #[test]
    fn quoted_identity_is_read_whole() {
        let records = parse_log("\"Smith, J\",2026-01-15T09:00:00.500Z,\n").unwrap();
        assert_eq!(records[0].identity.as_str(), "Smith, J");
        assert_eq!(records[0].entry_time.epoch_millis() % 1000, 500);
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, LOG).unwrap();
        assert_eq!(read_csv_log(&path).unwrap().len(), 6);
    }
}
