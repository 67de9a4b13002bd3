//! # Delivery Outbox
//!
//! Records emitted by the tracker wait here until the recorder acknowledges
//! them. Delivery is strictly FIFO: a flush stops at the first failure so a
//! later record never lands in the log ahead of an earlier one.
//!
//! The capacity is a gate, not a drop policy. A single tick may push past it
//! (every record it emits is kept), but while the outbox is saturated the
//! tick loop takes no new observations.

use std::collections::VecDeque;

use presence_core::IntervalRecord;

use crate::recorder::{AppendAck, IntervalRecorder, RecorderError};

/// Outcome of one [`Outbox::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Records newly appended.
    pub delivered: usize,
    /// Records the recorder already held.
    pub duplicates: usize,
    /// Records still queued afterwards.
    pub remaining: usize,
    /// The failure that stopped the flush, if any.
    pub error: Option<RecorderError>,
}

impl FlushReport {
    /// Whether the outbox was fully drained.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0 && self.error.is_none()
    }
}

/// Bounded FIFO of records awaiting acknowledgement.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<IntervalRecord>,
    capacity: usize,
}

impl Outbox {
    /// Create an outbox that saturates at `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue a record for delivery.
    pub fn push(&mut self, record: IntervalRecord) {
        self.queue.push_back(record);
    }

    /// Queue several records, preserving their order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = IntervalRecord>) {
        self.queue.extend(records);
    }

    /// Deliver queued records in order until empty or the recorder fails.
    pub fn flush<R: IntervalRecorder + ?Sized>(&mut self, recorder: &mut R) -> FlushReport {
        let mut report = FlushReport::default();
        while let Some(record) = self.queue.front() {
            match recorder.append(record) {
                Ok(AppendAck::Appended) => report.delivered += 1,
                Ok(AppendAck::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    tracing::warn!(record = %record, queued = self.queue.len(), error = %e, "append failed; record kept for retry");
                    report.error = Some(e);
                    break;
                }
            }
            self.queue.pop_front();
        }
        report.remaining = self.queue.len();
        report
    }

    /// Whether the loop must stop taking ticks.
    pub fn is_saturated(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Remove and return everything still queued.
    pub fn drain(&mut self) -> Vec<IntervalRecord> {
        self.queue.drain(..).collect()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Saturation bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryRecorder;
    use presence_core::{Identity, Timestamp};

    fn entry(name: &str, secs: i64) -> IntervalRecord {
        IntervalRecord::entry(
            Identity::new(name).unwrap(),
            Timestamp::from_epoch_secs(1_768_464_000 + secs).unwrap(),
        )
    }

    /// Fails every append while `failing` is set.
    struct Switch {
        inner: MemoryRecorder,
        failing: bool,
        attempts: usize,
    }

    impl IntervalRecorder for Switch {
        fn append(&mut self, record: &IntervalRecord) -> Result<AppendAck, RecorderError> {
            self.attempts += 1;
            if self.failing {
                return Err(RecorderError::append_failed(record, "disk full"));
            }
            self.inner.append(record)
        }
    }

    #[test]
    fn flush_delivers_in_order() {
        let mut outbox = Outbox::new(8);
        outbox.extend([entry("bob", 0), entry("alice", 1)]);
        let mut rec = MemoryRecorder::new();
        let report = outbox.flush(&mut rec);
        assert!(report.is_complete());
        assert_eq!(report.delivered, 2);
        assert_eq!(rec.records()[0].identity.as_str(), "bob");
        assert!(outbox.is_empty());
    }

    #[test]
    fn failure_keeps_record_at_head() {
        let mut outbox = Outbox::new(8);
        outbox.extend([entry("alice", 0), entry("bob", 1)]);
        let mut rec = Switch {
            inner: MemoryRecorder::new(),
            failing: true,
            attempts: 0,
        };

        let report = outbox.flush(&mut rec);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.remaining, 2);
        assert!(matches!(report.error, Some(RecorderError::AppendFailed { .. })));
        assert_eq!(rec.attempts, 1);

        rec.failing = false;
        let report = outbox.flush(&mut rec);
        assert!(report.is_complete());
        assert_eq!(rec.inner.to_lines().len(), 2);
        assert_eq!(rec.inner.records()[0].identity.as_str(), "alice");
    }

    #[test]
    fn duplicates_are_counted_and_removed() {
        let mut rec = MemoryRecorder::new();
        rec.append(&entry("alice", 0)).unwrap();
        let mut outbox = Outbox::new(8);
        outbox.push(entry("alice", 0));
        let report = outbox.flush(&mut rec);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.delivered, 0);
        assert!(outbox.is_empty());
    }

    #[test]
    fn saturation_is_a_gate_not_a_drop() {
        let mut outbox = Outbox::new(2);
        outbox.extend([entry("a", 0), entry("b", 0), entry("c", 0)]);
        assert!(outbox.is_saturated());
        assert_eq!(outbox.len(), 3);
        assert_eq!(outbox.drain().len(), 3);
        assert!(!outbox.is_saturated());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let outbox = Outbox::new(0);
        assert_eq!(outbox.capacity(), 1);
    }
}
