//! # Clocks
//!
//! The tracker never calls `Utc::now()` directly; it reads time through
//! [`Clock`] once per tick. [`SystemClock`] is the production wall clock and
//! never goes backwards. [`ManualClock`] is a deterministic clock for tests
//! and replays, shareable between the test body and the tracker that owns it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::temporal::Timestamp;

/// A source of "now" for presence transitions.
///
/// Implementations must be monotonically non-decreasing across calls.
pub trait Clock: Send {
    /// Read the current time.
    fn now(&mut self) -> Timestamp;
}

/// Wall-clock time, clamped so it never steps backwards.
///
/// NTP corrections can move the system clock back; an entry time must never
/// be later than the exit time computed on a subsequent tick.
#[derive(Debug, Default, Clone)]
pub struct SystemClock {
    last: Option<Timestamp>,
}

impl SystemClock {
    /// Create a wall clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Timestamp {
        let read = Timestamp::now();
        let now = match self.last {
            Some(last) if read < last => last,
            _ => read,
        };
        self.last = Some(now);
        now
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the tracker. With [`ManualClock::with_auto_advance`] every
/// read moves time forward by a fixed step after returning.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
    step_millis: i64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.epoch_millis())),
            step_millis: 0,
        }
    }

    /// Advance by `step_secs` after every read.
    pub fn with_auto_advance(self, step_secs: i64) -> Self {
        self.with_auto_advance_millis(step_secs.saturating_mul(1000))
    }

    /// Advance by `step_millis` after every read.
    pub fn with_auto_advance_millis(mut self, step_millis: i64) -> Self {
        self.step_millis = step_millis.max(0);
        self
    }

    /// Move time forward by `secs`. Negative values are ignored.
    pub fn advance(&self, secs: i64) {
        self.advance_millis(secs.saturating_mul(1000));
    }

    /// Move time forward by `millis`. Negative values are ignored.
    pub fn advance_millis(&self, millis: i64) {
        if millis > 0 {
            self.millis.fetch_add(millis, Ordering::SeqCst);
        }
    }

    /// The time the next read will return.
    pub fn peek(&self) -> Timestamp {
        to_timestamp(self.millis.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Timestamp {
        to_timestamp(self.millis.fetch_add(self.step_millis, Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&mut self) -> Timestamp {
        (**self).now()
    }
}

fn to_timestamp(millis: i64) -> Timestamp {
    Timestamp::from_epoch_millis(millis).unwrap_or_else(|_| Timestamp::now())
}
