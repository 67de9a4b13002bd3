#![deny(missing_docs)]

//! # presence-tracker — Debounced Presence Intervals
//!
//! Turns a stream of per-tick identity observations into attendance
//! intervals. An identity's interval opens the first tick it is seen and
//! closes once it has been absent for `max_miss_threshold` consecutive
//! ticks; brief dropouts in between do not split the interval.
//!
//! ## Crate layout
//!
//! - [`tracker`] — the state machine ([`PresenceTracker`]).
//! - [`source`] — observation adapter contract and the scripted and replay
//!   sources.
//! - [`recorder`] / [`csv_log`] — the append-only, idempotent recorder
//!   contract and its in-memory and file-backed implementations.
//! - [`outbox`] / [`runner`] — at-least-once delivery and the cooperative
//!   [`TickLoop`] with its stop and snapshot control surfaces.
//! - [`ledger`] — reconciling a written log back into intervals.
//! - [`config`] — YAML-loadable policy and loop settings.
//!
//! ## Example
//!
//! ```
//! use presence_core::{Identity, ManualClock, Timestamp};
//! use presence_tracker::{
//!     LoopConfig, MemoryRecorder, PresenceTracker, ScriptedSource, StopSignal, TickLoop,
//!     TrackerConfig,
//! };
//!
//! let clock = ManualClock::starting_at(Timestamp::parse("2026-01-15T09:00:00Z").unwrap())
//!     .with_auto_advance(1);
//! let tracker = PresenceTracker::new(TrackerConfig::default(), clock).unwrap();
//! let mut tick_loop = TickLoop::new(tracker, LoopConfig::default()).unwrap();
//!
//! let alice = Identity::new("alice").unwrap();
//! let source = ScriptedSource::new().then_observe([alice]).then_empty(5);
//! let mut log = MemoryRecorder::new();
//! let report = tick_loop.run(source, &mut log, &StopSignal::new()).unwrap();
//!
//! assert_eq!(report.closed, 1);
//! assert_eq!(log.to_lines()[1], "alice,2026-01-15T09:00:00Z,2026-01-15T09:00:05Z");
//! ```

pub mod config;
pub mod csv_log;
pub mod error;
pub mod ledger;
pub mod outbox;
pub mod recorder;
pub mod runner;
pub mod source;
pub mod state;
pub mod tracker;

pub use config::{ConfigError, LoopConfig, PresenceConfig, TrackerConfig};
pub use csv_log::CsvIntervalLog;
pub use error::TrackerError;
pub use ledger::{read_csv_log, AttendanceInterval, AttendanceLedger, IdentityTotal};
pub use outbox::{FlushReport, Outbox};
pub use recorder::{AppendAck, IntervalRecorder, MemoryRecorder, RecorderError};
pub use runner::{RunReport, SnapshotHandle, StopReason, StopSignal, TickLoop};
pub use source::{AdapterError, ObservationSource, ReplaySource, ScriptedSource};
pub use state::{OpenInterval, PresenceState, TrackerSnapshot};
pub use tracker::{PresenceTracker, TickOutcome};
