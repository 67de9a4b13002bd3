//! # Tick Loop
//!
//! Drives a [`PresenceTracker`] from an [`ObservationSource`] into an
//! [`IntervalRecorder`]. Single-threaded and cooperative: one tick at a time,
//! with the stop signal checked between ticks only.
//!
//! ## Per iteration
//!
//! 1. Deliver anything still queued from earlier ticks. If the outbox is
//!    saturated, keep retrying (pausing `retry_delay` between attempts)
//!    before taking another observation.
//! 2. Observe. An adapter failure becomes an empty tick.
//! 3. `process_tick`, queue the emitted records, attempt delivery.
//! 4. Publish a fresh [`TrackerSnapshot`] to every [`SnapshotHandle`].
//! 5. Sleep `tick_interval`, if configured.
//!
//! Control surfaces never touch the tracker directly. They hold a
//! [`StopSignal`] clone to ask for shutdown and a [`SnapshotHandle`] clone
//! to read state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use presence_core::{Identity, IntervalRecord, ObservedSet};
use serde::Serialize;

use crate::config::LoopConfig;
use crate::error::TrackerError;
use crate::outbox::{FlushReport, Outbox};
use crate::recorder::IntervalRecorder;
use crate::source::ObservationSource;
use crate::state::TrackerSnapshot;
use crate::tracker::PresenceTracker;

/// Longest uninterrupted sleep; bounds how late a stop request is noticed.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

// -- Control surfaces ---------------------------------------------------------

/// Cloneable cooperative stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current tick.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Cloneable read-only view of the tracker, republished after every tick.
///
/// Readers get an owned copy and never block the loop for longer than the
/// copy takes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<TrackerSnapshot>>,
}

impl SnapshotHandle {
    /// The most recently published snapshot.
    pub fn get(&self) -> TrackerSnapshot {
        self.inner.read().clone()
    }

    /// Whether `identity` was present as of the last tick.
    pub fn is_present(&self, identity: &Identity) -> bool {
        self.inner.read().is_present(identity)
    }

    /// Open intervals as of the last tick.
    pub fn open_count(&self) -> usize {
        self.inner.read().open_count()
    }

    /// Ticks processed as of the last publish.
    pub fn tick(&self) -> u64 {
        self.inner.read().tick
    }

    fn publish(&self, snapshot: TrackerSnapshot) {
        *self.inner.write() = snapshot;
    }
}

// -- Run report ---------------------------------------------------------------

/// Why [`TickLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The stop signal was raised.
    Requested,
    /// The observation source reported end of stream.
    SourceExhausted,
}

/// Summary of one [`TickLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Ticks processed, including ticks whose observation failed.
    pub ticks: u64,
    /// Intervals opened.
    pub opened: u64,
    /// Intervals closed, including any closed at shutdown.
    pub closed: u64,
    /// Ticks whose observation failed and were treated as empty.
    pub adapter_failures: u64,
    /// Failed append attempts. Each failed record stays queued.
    pub append_failures: u64,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Records the recorder never acknowledged, in emission order.
    pub undelivered: Vec<IntervalRecord>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            ticks: 0,
            opened: 0,
            closed: 0,
            adapter_failures: 0,
            append_failures: 0,
            stop_reason: StopReason::Requested,
            undelivered: Vec::new(),
        }
    }

    /// Whether every emitted record reached the recorder.
    pub fn fully_delivered(&self) -> bool {
        self.undelivered.is_empty()
    }
}

// -- Loop ---------------------------------------------------------------------

/// Owns a tracker and its delivery outbox.
#[derive(Debug)]
pub struct TickLoop {
    tracker: PresenceTracker,
    config: LoopConfig,
    outbox: Outbox,
    snapshot: SnapshotHandle,
}

impl TickLoop {
    /// Wrap `tracker` with the given delivery and pacing settings.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] if `config` does not validate.
    pub fn new(tracker: PresenceTracker, config: LoopConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        let snapshot = SnapshotHandle::default();
        snapshot.publish(tracker.snapshot());
        Ok(Self {
            outbox: Outbox::new(config.outbox_capacity),
            tracker,
            config,
            snapshot,
        })
    }

    /// A handle that observes this loop's tracker.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    /// The wrapped tracker.
    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    /// Unwrap the tracker.
    pub fn into_tracker(self) -> PresenceTracker {
        self.tracker
    }

    /// Loop settings.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run until `stop` is raised or `source` is exhausted.
    ///
    /// # Errors
    ///
    /// Only fatal errors: an invariant violation aborts the loop
    /// immediately. Adapter and recorder failures are counted in the
    /// returned [`RunReport`].
    pub fn run<S, R>(
        &mut self,
        mut source: S,
        mut recorder: R,
        stop: &StopSignal,
    ) -> Result<RunReport, TrackerError>
    where
        S: ObservationSource,
        R: IntervalRecorder,
    {
        let mut report = RunReport::new();
        tracing::info!(
            max_miss_threshold = self.tracker.config().max_miss_threshold,
            outbox_capacity = self.config.outbox_capacity,
            tick_interval_ms = self.config.tick_interval_ms,
            "tick loop started"
        );

        report.stop_reason = loop {
            if stop.is_stop_requested() {
                break StopReason::Requested;
            }
            if !self.deliver_with_backpressure(&mut recorder, stop, &mut report) {
                break StopReason::Requested;
            }

            let observed = match source.observe() {
                Ok(Some(set)) => set,
                Ok(None) => break StopReason::SourceExhausted,
                Err(e) => {
                    report.adapter_failures += 1;
                    tracing::warn!(tick = self.tracker.tick() + 1, error = %e, "observation failed; treating tick as empty");
                    ObservedSet::new()
                }
            };

            let outcome = match self.tracker.process_tick(&observed) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, queued = self.outbox.len(), "tick loop aborted");
                    return Err(e);
                }
            };
            report.ticks += 1;
            report.opened += outcome.opened.len() as u64;
            report.closed += outcome.closed.len() as u64;
            self.outbox.extend(outcome.into_records());

            self.flush(&mut recorder, &mut report);
            self.snapshot.publish(self.tracker.snapshot());

            if let Some(interval) = self.config.tick_interval() {
                pause(stop, interval);
            }
        };

        if self.config.close_open_on_stop {
            let records = self.tracker.close_all()?;
            report.closed += records.len() as u64;
            self.outbox.extend(records);
        }
        if !self.outbox.is_empty() {
            self.flush(&mut recorder, &mut report);
        }
        self.snapshot.publish(self.tracker.snapshot());
        report.undelivered = self.outbox.drain();

        if report.fully_delivered() {
            tracing::info!(
                ticks = report.ticks,
                opened = report.opened,
                closed = report.closed,
                stop_reason = ?report.stop_reason,
                "tick loop stopped"
            );
        } else {
            tracing::warn!(
                ticks = report.ticks,
                undelivered = report.undelivered.len(),
                stop_reason = ?report.stop_reason,
                "tick loop stopped with undelivered records"
            );
        }
        Ok(report)
    }

    fn flush<R: IntervalRecorder>(&mut self, recorder: &mut R, report: &mut RunReport) -> FlushReport {
        let flushed = self.outbox.flush(recorder);
        if flushed.error.is_some() {
            report.append_failures += 1;
        }
        if flushed.duplicates > 0 {
            tracing::debug!(duplicates = flushed.duplicates, "recorder already held redelivered records");
        }
        flushed
    }

    /// Retry queued records before the next tick. Returns `false` if a stop
    /// was requested while the outbox was still saturated.
    fn deliver_with_backpressure<R: IntervalRecorder>(
        &mut self,
        recorder: &mut R,
        stop: &StopSignal,
        report: &mut RunReport,
    ) -> bool {
        if self.outbox.is_empty() {
            return true;
        }
        self.flush(recorder, report);

        let mut announced = false;
        while self.outbox.is_saturated() {
            if !announced {
                tracing::warn!(
                    queued = self.outbox.len(),
                    capacity = self.outbox.capacity(),
                    "outbox saturated; pausing ticks until the recorder recovers"
                );
                announced = true;
            }
            pause(stop, self.config.retry_delay());
            if stop.is_stop_requested() {
                return false;
            }
            self.flush(recorder, report);
        }
        if announced {
            tracing::info!(queued = self.outbox.len(), "outbox drained below capacity; resuming ticks");
        }
        true
    }
}

/// Sleep for `duration`, waking early if `stop` is raised.
fn pause(stop: &StopSignal, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !stop.is_stop_requested() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}
