//! # Presence Tracker
//!
//! The debounced presence state machine. One call to
//! [`PresenceTracker::process_tick`] per discrete time step, with the set of
//! identities observed during that step (possibly empty).
//!
//! ## Transitions per tick
//!
//! Time is read once per tick; every record emitted by the tick carries that
//! same instant. Tick instants strictly increase, even when the clock stalls
//! or steps back.
//!
//! 1. Each observed identity without an open interval opens one
//!    (`entry_time = now`) and emits an entry record. An observed identity
//!    with an open interval has its miss count reset to zero.
//! 2. Each open identity that was not observed counts a miss. When the count
//!    reaches `max_miss_threshold` the interval closes: an exit record
//!    `{identity, entry_time, now}` is emitted and the state is removed.
//!
//! An identity that reappears before the threshold keeps its original entry
//! time, so a noisy detector does not fragment one presence into many short
//! intervals. Removal on close is the sole authority for "this interval
//! still exists": no interval closes twice, and a later observation opens a
//! genuinely new interval.
//!
//! ## Ordering
//!
//! Identities are independent, so the order in which they are processed
//! does not change the resulting table. Emission order is still made
//! deterministic: entries in identity order, then exits in identity order.

use std::collections::HashMap;

use presence_core::{Clock, Identity, IntervalRecord, ObservedSet, SystemClock, Timestamp};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::state::{OpenInterval, PresenceState, TrackerSnapshot};

/// Records emitted by one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// 1-based tick number.
    pub tick: u64,
    /// The time read for this tick.
    pub at: Timestamp,
    /// Entry records for intervals opened this tick.
    pub opened: Vec<IntervalRecord>,
    /// Exit records for intervals closed this tick.
    pub closed: Vec<IntervalRecord>,
}

impl TickOutcome {
    /// All records in emission order (entries, then exits).
    pub fn records(&self) -> impl Iterator<Item = &IntervalRecord> {
        self.opened.iter().chain(self.closed.iter())
    }

    /// Consume into records in emission order.
    pub fn into_records(self) -> Vec<IntervalRecord> {
        let mut records = self.opened;
        records.extend(self.closed);
        records
    }

    /// Whether the tick emitted nothing.
    pub fn is_quiet(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

/// The presence state machine and its tracking table.
///
/// The table is owned: every mutation goes through `&mut self`, so exactly
/// one tick is in flight at a time. Other threads see it only through
/// [`PresenceTracker::snapshot`].
pub struct PresenceTracker {
    config: TrackerConfig,
    clock: Box<dyn Clock>,
    table: HashMap<Identity, PresenceState>,
    tick: u64,
    last_tick_at: Option<Timestamp>,
    last_read: Option<Timestamp>,
}

impl PresenceTracker {
    /// Create a tracker reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] if the config does not validate.
    pub fn new(config: TrackerConfig, clock: impl Clock + 'static) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            config,
            clock: Box::new(clock),
            table: HashMap::new(),
            tick: 0,
            last_tick_at: None,
            last_read: None,
        })
    }

    /// Create a tracker reading the system wall clock.
    pub fn with_system_clock(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::new(config, SystemClock::new())
    }

    /// Ingest one tick of observations.
    ///
    /// # Errors
    ///
    /// Only [`TrackerError::InvariantViolation`], which indicates a bug and
    /// must abort the caller's loop.
    pub fn process_tick(&mut self, observed: &ObservedSet) -> Result<TickOutcome, TrackerError> {
        self.tick += 1;
        let now = self.read_clock();
        let threshold = self.config.max_miss_threshold;

        let mut opened = Vec::new();
        for identity in observed {
            match self.table.get_mut(identity) {
                Some(state) => state.mark_observed(),
                None => {
                    self.table
                        .insert(identity.clone(), PresenceState::open(identity.clone(), now));
                    tracing::info!(tick = self.tick, identity = %identity, entry_time = %now, "interval opened");
                    opened.push(IntervalRecord::entry(identity.clone(), now));
                }
            }
        }

        let mut expired = Vec::new();
        for (identity, state) in self.table.iter_mut() {
            if observed.contains(identity) {
                continue;
            }
            let misses = state.mark_missed();
            if misses >= threshold {
                expired.push(identity.clone());
            } else {
                tracing::trace!(tick = self.tick, identity = %identity, misses, "identity absent");
            }
        }
        expired.sort();

        let mut closed = Vec::with_capacity(expired.len());
        for identity in expired {
            let state = self.table.remove(&identity).ok_or_else(|| {
                TrackerError::invariant(self.tick, format!("expired state for {identity} vanished"))
            })?;
            let record = IntervalRecord::exit(identity, state.entry_time(), now)
                .map_err(|e| TrackerError::from_validation(self.tick, e))?;
            tracing::info!(
                tick = self.tick,
                identity = %record.identity,
                entry_time = %record.entry_time,
                exit_time = %now,
                "interval closed"
            );
            closed.push(record);
        }

        self.check_invariants()?;

        Ok(TickOutcome {
            tick: self.tick,
            at: now,
            opened,
            closed,
        })
    }

    /// Close every open interval at the current time.
    ///
    /// Not a tick: miss counts are not consulted and the tick counter does
    /// not advance. Used when the operator wants no interval left open at
    /// shutdown.
    pub fn close_all(&mut self) -> Result<Vec<IntervalRecord>, TrackerError> {
        let now = self.read_clock();
        let mut states: Vec<PresenceState> = self.table.drain().map(|(_, s)| s).collect();
        states.sort_by(|a, b| a.identity().cmp(b.identity()));

        let tick = self.tick;
        states
            .into_iter()
            .map(|state| {
                tracing::info!(identity = %state.identity(), exit_time = %now, "interval closed on shutdown");
                IntervalRecord::exit(state.identity().clone(), state.entry_time(), now)
                    .map_err(|e| TrackerError::from_validation(tick, e))
            })
            .collect()
    }

    /// Verify the tracking table.
    ///
    /// Checks that every key matches its state's identity, that no entry
    /// time lies after the most recent tick, and that no open state has
    /// already reached the miss threshold.
    pub fn check_invariants(&self) -> Result<(), TrackerError> {
        for (key, state) in &self.table {
            if key != state.identity() {
                return Err(TrackerError::invariant(
                    self.tick,
                    format!("table key {key} holds state for {}", state.identity()),
                ));
            }
            if let Some(last) = self.last_tick_at {
                if state.entry_time() > last {
                    return Err(TrackerError::invariant(
                        self.tick,
                        format!(
                            "{key} entered at {} after last tick time {last}",
                            state.entry_time()
                        ),
                    ));
                }
            }
            if state.consecutive_miss_count() >= self.config.max_miss_threshold {
                return Err(TrackerError::invariant(
                    self.tick,
                    format!(
                        "{key} still open with {} misses (threshold {})",
                        state.consecutive_miss_count(),
                        self.config.max_miss_threshold
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Owned copy of the tracking table, ordered by identity.
    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut open: Vec<OpenInterval> = self.table.values().map(OpenInterval::from).collect();
        open.sort_by(|a, b| a.identity.cmp(&b.identity));
        TrackerSnapshot {
            tick: self.tick,
            last_tick_at: self.last_tick_at,
            open,
        }
    }

    /// Whether `identity` has an open interval.
    pub fn is_open(&self, identity: &Identity) -> bool {
        self.table.contains_key(identity)
    }

    /// The open state for `identity`, if any.
    pub fn state(&self, identity: &Identity) -> Option<&PresenceState> {
        self.table.get(identity)
    }

    /// Number of open intervals.
    pub fn open_count(&self) -> usize {
        self.table.len()
    }

    /// Number of ticks processed.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The time read on the most recent tick.
    pub fn last_tick_at(&self) -> Option<Timestamp> {
        self.last_tick_at
    }

    /// Active policy.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Read the clock. The result is strictly later than the previous
    /// reading: a stalled or backwards clock is nudged forward by one
    /// millisecond, so an interval reopened after a close never shares the
    /// closed interval's entry time.
    fn read_clock(&mut self) -> Timestamp {
        let read = self.clock.now();
        if let Some(prev) = self.last_read.replace(read) {
            if read < prev {
                tracing::warn!(read = %read, previous = %prev, "clock stepped backwards");
            }
        }
        let now = match self.last_tick_at {
            Some(last) if read <= last => last.plus_millis(1),
            _ => read,
        };
        self.last_tick_at = Some(now);
        now
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("config", &self.config)
            .field("open", &self.table.len())
            .field("tick", &self.tick)
            .field("last_tick_at", &self.last_tick_at)
            .finish()
    }
}
