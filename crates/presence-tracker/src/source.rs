//! # Observation Sources
//!
//! The producer side of the tracker. Each call to
//! [`ObservationSource::observe`] yields the identities resolved during one
//! tick. Face detection, embedding and matching all happen behind this
//! trait; unresolved ("Unknown") detections never reach the tracker.
//!
//! A failed tick is reported as [`AdapterError::Unavailable`]. The tick loop
//! still counts it as a tick with nothing observed, so a flaky camera cannot
//! hold intervals open indefinitely.

use std::collections::VecDeque;
use std::io::BufRead;

use presence_core::{Identity, ObservedSet};
use thiserror::Error;

/// Token an adapter uses for a detection it could not resolve.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Observation adapter failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No observation could be produced for this tick.
    #[error("observation source unavailable: {reason}")]
    Unavailable {
        /// Why the tick failed.
        reason: String,
    },
}

impl AdapterError {
    /// Shorthand for [`AdapterError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Producer of one observed identity set per tick.
pub trait ObservationSource {
    /// Observe the next tick.
    ///
    /// - `Ok(Some(set))` — the identities seen this tick (possibly none).
    /// - `Ok(None)` — the stream has ended; no more ticks.
    /// - `Err(_)` — this tick failed; later ticks may succeed.
    fn observe(&mut self) -> Result<Option<ObservedSet>, AdapterError>;
}

impl<S: ObservationSource + ?Sized> ObservationSource for &mut S {
    fn observe(&mut self) -> Result<Option<ObservedSet>, AdapterError> {
        (**self).observe()
    }
}

impl<S: ObservationSource + ?Sized> ObservationSource for Box<S> {
    fn observe(&mut self) -> Result<Option<ObservedSet>, AdapterError> {
        (**self).observe()
    }
}

/// A pre-programmed sequence of tick results.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    ticks: VecDeque<Result<ObservedSet, AdapterError>>,
}

impl ScriptedSource {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a tick observing `identities`.
    pub fn then_observe<I>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        self.ticks.push_back(Ok(identities.into_iter().collect()));
        self
    }

    /// Builder: append `count` ticks observing nothing.
    pub fn then_empty(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.ticks.push_back(Ok(ObservedSet::new()));
        }
        self
    }

    /// Builder: append a failed tick.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.ticks.push_back(Err(AdapterError::unavailable(reason)));
        self
    }

    /// Ticks not yet observed.
    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl ObservationSource for ScriptedSource {
    fn observe(&mut self) -> Result<Option<ObservedSet>, AdapterError> {
        match self.ticks.pop_front() {
            Some(Ok(set)) => Ok(Some(set)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Reads ticks from a line-oriented replay stream.
///
/// ```text
/// # comment lines are skipped and do not produce a tick
/// alice,bob          one tick observing alice and bob
///                    (empty line) one tick observing nobody
/// !camera timeout    one failed tick
/// alice,Unknown      unresolved detections are dropped
/// "Smith, J",bob     CSV quoting for identities containing commas
/// ```
#[derive(Debug)]
pub struct ReplaySource<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> ReplaySource<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    fn parse_tick(&self, line: &str) -> ObservedSet {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(line.as_bytes());
        let mut tokens = csv::StringRecord::new();
        if let Err(e) = reader.read_record(&mut tokens) {
            tracing::warn!(line = self.line_no, error = %e, "dropping unreadable observation line");
            return ObservedSet::new();
        }

        tokens
            .iter()
            .filter(|token| !token.is_empty())
            .filter(|token| {
                let unknown = token.eq_ignore_ascii_case(UNKNOWN_TOKEN);
                if unknown {
                    tracing::trace!(line = self.line_no, "dropping unresolved observation");
                }
                !unknown
            })
            .filter_map(|token| match Identity::new(token) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(line = self.line_no, token, error = %e, "dropping invalid identity");
                    None
                }
            })
            .collect()
    }
}

impl<R: BufRead> ObservationSource for ReplaySource<R> {
    fn observe(&mut self) -> Result<Option<ObservedSet>, AdapterError> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|e| AdapterError::unavailable(format!("replay read failed: {e}")))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.trim_start().starts_with('#') {
                continue;
            }
            if let Some(reason) = line.trim_start().strip_prefix('!') {
                return Err(AdapterError::unavailable(reason.trim()));
            }
            return Ok(Some(self.parse_tick(line)));
        }
    }
}
