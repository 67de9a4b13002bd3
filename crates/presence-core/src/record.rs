//! # Interval Records
//!
//! An [`IntervalRecord`] is what the tracker hands to the recorder. Each
//! presence interval produces two of them over its life:
//!
//! ```text
//! entry:  alice,2026-01-15T12:00:00.250Z,
//! exit:   alice,2026-01-15T12:00:00.250Z,2026-01-15T12:05:10Z
//! ```
//!
//! Lines are CSV rows, so an identity containing `,` or `"` is quoted.
//!
//! The exit is a new line, never an in-place update of the entry line. Both
//! share `(identity, entry_time)`, which together with the [`RecordKind`]
//! forms the recorder's dedup [`RecordKey`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::Identity;
use crate::temporal::Timestamp;

/// Whether a record announces an interval opening or closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Interval opened; no exit time yet.
    Entry,
    /// Interval closed.
    Exit,
}

impl RecordKind {
    /// Return the string value for logs and serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural dedup key for a record: redelivering a record with the same key
/// must not produce a second logged line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// The identity the interval belongs to.
    pub identity: Identity,
    /// When the interval opened.
    pub entry_time: Timestamp,
    /// Entry or exit notification.
    pub kind: RecordKind,
}

/// An immutable attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// The identity the interval belongs to.
    pub identity: Identity,
    /// When the interval opened.
    pub entry_time: Timestamp,
    /// When the interval closed; `None` on the entry notification.
    pub exit_time: Option<Timestamp>,
}

impl IntervalRecord {
    /// Build the entry notification for a freshly opened interval.
    pub fn entry(identity: Identity, entry_time: Timestamp) -> Self {
        Self {
            identity,
            entry_time,
            exit_time: None,
        }
    }

    /// Build the closing record for an interval.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ExitBeforeEntry`] if `exit_time` precedes
    /// `entry_time`.
    pub fn exit(
        identity: Identity,
        entry_time: Timestamp,
        exit_time: Timestamp,
    ) -> Result<Self, ValidationError> {
        if exit_time < entry_time {
            return Err(ValidationError::ExitBeforeEntry {
                identity: identity.to_string(),
                entry: entry_time.to_string(),
                exit: exit_time.to_string(),
            });
        }
        Ok(Self {
            identity,
            entry_time,
            exit_time: Some(exit_time),
        })
    }

    /// Entry or exit.
    pub fn kind(&self) -> RecordKind {
        if self.exit_time.is_some() {
            RecordKind::Exit
        } else {
            RecordKind::Entry
        }
    }

    /// Whether this is an entry notification.
    pub fn is_entry(&self) -> bool {
        self.exit_time.is_none()
    }

    /// The recorder dedup key.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            identity: self.identity.clone(),
            entry_time: self.entry_time,
            kind: self.kind(),
        }
    }

    /// Seconds between entry and exit, if closed.
    pub fn duration_secs(&self) -> Option<i64> {
        self.exit_time
            .map(|exit| self.entry_time.seconds_until(&exit))
    }

    /// Encode as one CSV row `identity,entry_time,exit_time_or_empty`
    /// (no terminator). Identities containing `,` or `"` are quoted.
    pub fn to_line(&self) -> String {
        let entry = self.entry_time.to_iso8601();
        let exit = self.exit_time.map(|t| t.to_iso8601()).unwrap_or_default();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        // In-memory writes cannot fail.
        let _ = writer.write_record([self.identity.as_str(), entry.as_str(), exit.as_str()]);
        let bytes = writer.into_inner().unwrap_or_default();
        String::from_utf8_lossy(&bytes)
            .trim_end_matches(['\n', '\r'])
            .to_string()
    }

    /// Decode one log line. A trailing `\n` or `\r\n` is tolerated.
    ///
    /// Timestamps are read with [`Timestamp::parse_lenient`] so logs written
    /// with whole seconds or in the legacy `YYYY-MM-DD HH:MM:SS` layout
    /// remain readable.
    pub fn parse_line(line: &str) -> Result<Self, ValidationError> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(trimmed.as_bytes());
        let mut fields = csv::StringRecord::new();
        let malformed = |reason: String| ValidationError::MalformedLine {
            line: trimmed.to_string(),
            reason,
        };
        let found = reader
            .read_record(&mut fields)
            .map_err(|e| malformed(e.to_string()))?;
        if !found {
            return Err(malformed("expected 3 fields, found 0".into()));
        }
        if reader.read_record(&mut csv::StringRecord::new()).unwrap_or(false) {
            return Err(malformed("more than one row".into()));
        }
        Self::from_fields(fields.iter())
    }

    /// Build a record from the three decoded columns of a log row.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: Vec<&str> = fields.into_iter().collect();
        let &[identity, entry, exit] = fields.as_slice() else {
            return Err(ValidationError::MalformedLine {
                line: fields.join(","),
                reason: format!("expected 3 fields, found {}", fields.len()),
            });
        };

        let identity = Identity::new(identity)?;
        let entry_time = Timestamp::parse_lenient(entry.trim())?;
        let exit = exit.trim();
        if exit.is_empty() {
            return Ok(Self::entry(identity, entry_time));
        }
        let exit_time = Timestamp::parse_lenient(exit)?;
        Self::exit(identity, entry_time, exit_time)
    }
}

impl std::fmt::Display for IntervalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> Identity {
        Identity::new("alice").unwrap()
    }

    fn t(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn entry_line_has_empty_exit_column() {
        let rec = IntervalRecord::entry(alice(), t("2026-01-15T12:00:00Z"));
        assert_eq!(rec.to_line(), "alice,2026-01-15T12:00:00Z,");
        assert_eq!(rec.kind(), RecordKind::Entry);
        assert!(rec.duration_secs().is_none());
    }

    #[test]
    fn exit_line_carries_both_times() {
        let rec = IntervalRecord::exit(
            alice(),
            t("2026-01-15T12:00:00Z"),
            t("2026-01-15T12:05:10Z"),
        )
        .unwrap();
        assert_eq!(
            rec.to_line(),
            "alice,2026-01-15T12:00:00Z,2026-01-15T12:05:10Z"
        );
        assert_eq!(rec.kind(), RecordKind::Exit);
        assert_eq!(rec.duration_secs(), Some(310));
    }

    #[test]
    fn exit_before_entry_is_rejected() {
        let err = IntervalRecord::exit(
            alice(),
            t("2026-01-15T12:00:00Z"),
            t("2026-01-15T11:59:59Z"),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ExitBeforeEntry { .. }));
    }

    #[test]
    fn entry_and_exit_keys_differ_only_by_kind() {
        let entry = IntervalRecord::entry(alice(), t("2026-01-15T12:00:00Z"));
        let exit = IntervalRecord::exit(
            alice(),
            t("2026-01-15T12:00:00Z"),
            t("2026-01-15T12:01:00Z"),
        )
        .unwrap();
        let (ke, kx) = (entry.key(), exit.key());
        assert_eq!(ke.identity, kx.identity);
        assert_eq!(ke.entry_time, kx.entry_time);
        assert_ne!(ke, kx);
    }

    #[test]
    fn parse_line_reads_both_shapes() {
        let entry = IntervalRecord::parse_line("alice,2026-01-15T12:00:00Z,\n").unwrap();
        assert!(entry.is_entry());

        let exit =
            IntervalRecord::parse_line("alice,2026-01-15T12:00:00Z,2026-01-15T12:00:30Z\r\n")
                .unwrap();
        assert_eq!(exit.duration_secs(), Some(30));
    }

    #[test]
    fn parse_line_reads_legacy_timestamps() {
        let rec = IntervalRecord::parse_line("bob,2024-03-01 09:15:00,2024-03-01 09:20:00").unwrap();
        assert_eq!(rec.entry_time.to_iso8601(), "2024-03-01T09:15:00Z");
        assert_eq!(rec.duration_secs(), Some(300));
    }

    #[test]
    fn identity_with_comma_is_quoted() {
        let rec = IntervalRecord::entry(
            Identity::new("Smith, J").unwrap(),
            t("2026-01-15T12:00:00Z"),
        );
        assert_eq!(rec.to_line(), "\"Smith, J\",2026-01-15T12:00:00Z,");
        assert_eq!(IntervalRecord::parse_line(&rec.to_line()).unwrap(), rec);
    }

    #[test]
    fn millisecond_times_are_kept() {
        let line = "alice,2026-01-15T12:00:00.250Z,2026-01-15T12:00:00.900Z";
        let rec = IntervalRecord::parse_line(line).unwrap();
        assert_eq!(rec.entry_time.millis_until(&rec.exit_time.unwrap()), 650);
        assert_eq!(rec.to_line(), line);
    }

    #[test]
    fn parse_line_rejects_wrong_field_count() {
        for bad in ["", "alice", "alice,2026-01-15T12:00:00Z", "a,b,c,d"] {
            assert!(matches!(
                IntervalRecord::parse_line(bad),
                Err(ValidationError::MalformedLine { .. })
            ));
        }
    }

    #[test]
    fn parse_line_rejects_bad_fields() {
        assert!(IntervalRecord::parse_line(",2026-01-15T12:00:00Z,").is_err());
        assert!(IntervalRecord::parse_line("alice,yesterday,").is_err());
        assert!(IntervalRecord::parse_line(
            "alice,2026-01-15T12:00:00Z,2026-01-15T11:00:00Z"
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn parse_line_never_panics(line in "\\PC{0,64}") {
            let _ = IntervalRecord::parse_line(&line);
        }

        #[test]
        fn quoted_identities_decode_to_the_same_record(
            name in "[A-Za-z][A-Za-z ,\"]{0,15}",
            start in 0i64..4_000_000_000_000,
            len in proptest::option::of(0i64..100_000_000),
        ) {
            let identity = Identity::new(&name).unwrap();
            let entry = Timestamp::from_epoch_millis(start).unwrap();
            let rec = match len {
                Some(millis) => {
                    IntervalRecord::exit(identity, entry, entry.plus_millis(millis)).unwrap()
                }
                None => IntervalRecord::entry(identity, entry),
            };
            prop_assert_eq!(IntervalRecord::parse_line(&rec.to_line()).unwrap(), rec);
        }
    }
}
