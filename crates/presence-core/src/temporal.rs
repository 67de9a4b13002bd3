//! # Timestamps
//!
//! Entry and exit times are [`Timestamp`]s: UTC, millisecond precision.
//! They are part of the recorder's dedup key `(identity, entry_time)`, so
//! two reads of "the same instant" must compare equal: anything finer than
//! a millisecond is discarded at construction and local offsets are
//! normalized away.
//!
//! The flat log renders timestamps as `YYYY-MM-DDTHH:MM:SS.sssZ`, dropping
//! the fraction when it is zero. Older logs written with whole seconds, or
//! as `YYYY-MM-DD HH:MM:SS`, are still readable through
//! [`Timestamp::parse_lenient`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Legacy `strftime` layout used by older attendance logs.
const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A UTC timestamp, truncated to millisecond precision.
///
/// Build one with [`Timestamp::now`], [`Timestamp::from_utc`],
/// [`Timestamp::from_epoch_millis`] or [`Timestamp::parse`]. Every path
/// drops sub-millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Wrap a `DateTime<Utc>`, dropping sub-milliseconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_millis(dt))
    }

    /// From Unix seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: secs.to_string(),
                reason: "out of range for a UTC datetime".into(),
            })
    }

    /// From Unix milliseconds.
    pub fn from_epoch_millis(millis: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: format!("{millis}ms"),
                reason: "out of range for a UTC datetime".into(),
            })
    }

    /// Parse an RFC 3339 timestamp. Only the `Z` suffix is accepted;
    /// explicit offsets, even `+00:00`, are rejected.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::InvalidTimestamp {
                value: s.to_string(),
                reason: "must use Z suffix (UTC only)".into(),
            });
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            ValidationError::InvalidTimestamp {
                value: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// Parse a timestamp from any RFC 3339 offset, or from the legacy
    /// `YYYY-MM-DD HH:MM:SS` layout (interpreted as UTC).
    pub fn parse_lenient(s: &str) -> Result<Self, ValidationError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_utc(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(s, LEGACY_FORMAT)
            .map(|naive| Self::from_utc(Utc.from_utc_datetime(&naive)))
            .map_err(|e| ValidationError::InvalidTimestamp {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }

    /// The underlying chrono value.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Unix milliseconds.
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Return a timestamp `secs` seconds later (earlier if negative),
    /// saturating at the representable range.
    pub fn plus_secs(&self, secs: i64) -> Self {
        self.plus_millis(secs.saturating_mul(1000))
    }

    /// Return a timestamp `millis` milliseconds later (earlier if negative).
    /// Out-of-range results leave the timestamp unchanged.
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self::from_epoch_millis(self.epoch_millis().saturating_add(millis)).unwrap_or(*self)
    }

    /// Whole seconds from `self` to `later`, truncated toward zero.
    /// Negative if `later` is earlier.
    pub fn seconds_until(&self, later: &Timestamp) -> i64 {
        self.millis_until(later) / 1000
    }

    /// Milliseconds from `self` to `later`.
    pub fn millis_until(&self, later: &Timestamp) -> i64 {
        later.epoch_millis() - self.epoch_millis()
    }

    /// Render as ISO 8601 with Z suffix: `2026-01-15T12:00:00Z`, or
    /// `2026-01-15T12:00:00.250Z` when the millisecond part is non-zero.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond();
    dt.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_millisecond_aligned() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn from_utc_truncates_to_millis() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(123_456_789).unwrap());
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45.123Z");
        let same = Timestamp::from_utc(dt.with_nanosecond(123_999_999).unwrap());
        assert_eq!(ts, same);
    }

    #[test]
    fn whole_seconds_render_without_fraction() {
        let ts = Timestamp::from_epoch_millis(1_768_464_000_000).unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T08:00:00Z");
        assert_eq!(ts.plus_millis(7).to_iso8601(), "2026-01-15T08:00:00.007Z");
    }

    #[test]
    fn sub_second_instants_stay_distinct() {
        let t0 = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let t1 = Timestamp::parse("2026-01-15T12:00:00.200Z").unwrap();
        assert!(t0 < t1);
        assert_eq!(t0.millis_until(&t1), 200);
        assert_eq!(t0.seconds_until(&t1), 0);
        assert_eq!(Timestamp::parse(&t1.to_iso8601()).unwrap(), t1);
    }

    #[test]
    fn display_matches_iso8601() {
        let ts = Timestamp::from_epoch_secs(1_767_225_600).unwrap();
        assert_eq!(format!("{ts}"), ts.to_iso8601());
    }

    #[test]
    fn parse_accepts_z_suffix() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn parse_rejects_offsets() {
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-01-15T17:00:00+05:00").is_err());
        assert!(Timestamp::parse("not a time").is_err());
    }

    #[test]
    fn parse_lenient_normalizes_offsets() {
        let ts = Timestamp::parse_lenient("2026-01-15T17:00:00+05:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn parse_lenient_reads_second_precision_lines() {
        let ts = Timestamp::parse_lenient("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.epoch_millis() % 1000, 0);
    }

    #[test]
    fn parse_lenient_reads_legacy_layout() {
        let ts = Timestamp::parse_lenient("2024-03-01 09:15:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2024-03-01T09:15:00Z");
    }

    #[test]
    fn arithmetic_helpers() {
        let t0 = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let t1 = t0.plus_secs(90);
        assert_eq!(t1.to_iso8601(), "2026-01-15T12:01:30Z");
        assert_eq!(t0.seconds_until(&t1), 90);
        assert_eq!(t1.seconds_until(&t0), -90);
        assert!(t0 < t1);
    }

    #[test]
    fn serde_round_trip() {
        let ts = Timestamp::parse("2026-06-30T23:59:59Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
