//! # Presence State
//!
//! Per-identity bookkeeping for an open interval, and the read-only snapshot
//! shape handed to control surfaces.
//!
//! ```text
//!            observed (no open state)
//!   closed ───────────────────────────▶ open { miss = 0 }
//!     ▲                                   │  ▲
//!     │ miss reaches threshold            │  │ observed: miss = 0
//!     │ (exit record emitted,             ▼  │
//!     │  state removed)                 open { miss = n } ── absent: miss += 1
//!     └───────────────────────────────────┘
//! ```

use presence_core::{Identity, Timestamp};
use serde::{Deserialize, Serialize};

/// Tracking-table entry for an identity whose interval is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    identity: Identity,
    entry_time: Timestamp,
    consecutive_miss_count: u32,
}

impl PresenceState {
    pub(crate) fn open(identity: Identity, entry_time: Timestamp) -> Self {
        Self {
            identity,
            entry_time,
            consecutive_miss_count: 0,
        }
    }

    /// The identity this interval belongs to.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// When the interval opened. Never changes while open.
    pub fn entry_time(&self) -> Timestamp {
        self.entry_time
    }

    /// Consecutive ticks since the identity was last observed.
    pub fn consecutive_miss_count(&self) -> u32 {
        self.consecutive_miss_count
    }

    pub(crate) fn mark_observed(&mut self) {
        self.consecutive_miss_count = 0;
    }

    /// Count one more missed tick and return the new count.
    pub(crate) fn mark_missed(&mut self) -> u32 {
        self.consecutive_miss_count = self.consecutive_miss_count.saturating_add(1);
        self.consecutive_miss_count
    }
}

/// One open interval as seen in a [`TrackerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterval {
    /// The identity present.
    pub identity: Identity,
    /// When the interval opened.
    pub entry_time: Timestamp,
    /// Consecutive missed ticks so far.
    pub consecutive_miss_count: u32,
}

impl From<&PresenceState> for OpenInterval {
    fn from(state: &PresenceState) -> Self {
        Self {
            identity: state.identity.clone(),
            entry_time: state.entry_time,
            consecutive_miss_count: state.consecutive_miss_count,
        }
    }
}

/// Owned copy of the tracking table for read-only consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Number of ticks processed.
    pub tick: u64,
    /// Time read on the most recent tick.
    pub last_tick_at: Option<Timestamp>,
    /// Open intervals, ordered by identity.
    pub open: Vec<OpenInterval>,
}

impl TrackerSnapshot {
    /// Whether `identity` currently has an open interval.
    pub fn is_present(&self, identity: &Identity) -> bool {
        self.open.iter().any(|o| &o.identity == identity)
    }

    /// Number of open intervals.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_for_control_surfaces() {
        let snapshot = TrackerSnapshot {
            tick: 3,
            last_tick_at: Some(Timestamp::parse("2026-01-15T09:00:02Z").unwrap()),
            open: vec![OpenInterval::from(&PresenceState::open(
                Identity::new("alice").unwrap(),
                Timestamp::parse("2026-01-15T09:00:00Z").unwrap(),
            ))],
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["tick"], 3);
        assert_eq!(value["open"][0]["identity"], "alice");
        assert_eq!(value["open"][0]["entry_time"], "2026-01-15T09:00:00Z");
        assert_eq!(value["open"][0]["consecutive_miss_count"], 0);
    }

    #[test]
    fn miss_count_resets_on_observation() {
        let mut state = PresenceState::open(
            Identity::new("bob").unwrap(),
            Timestamp::parse("2026-01-15T09:00:00Z").unwrap(),
        );
        assert_eq!(state.mark_missed(), 1);
        assert_eq!(state.mark_missed(), 2);
        state.mark_observed();
        assert_eq!(state.consecutive_miss_count(), 0);
    }
}
