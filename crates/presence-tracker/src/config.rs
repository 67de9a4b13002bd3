//! # Configuration
//!
//! Typed configuration for the tracker and its tick loop, loadable from
//! YAML:
//!
//! ```yaml
//! tracker:
//!   max_miss_threshold: 5
//! runtime:
//!   outbox_capacity: 1024
//!   tick_interval_ms: 33
//!   retry_delay_ms: 250
//!   close_open_on_stop: false
//! ```
//!
//! Every field has a default, so an empty document is a valid config.
//! `MAX_MISS_THRESHOLD` is the only policy knob of the state machine itself;
//! the `runtime` section only shapes delivery and pacing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of consecutive missed ticks that closes an interval.
pub const DEFAULT_MAX_MISS_THRESHOLD: u32 = 5;

/// Default bound on emitted-but-unacknowledged records.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Default pause between delivery retries while the outbox is saturated.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The miss threshold must be a positive integer.
    #[error("max_miss_threshold must be at least 1, got {0}")]
    ZeroThreshold(u32),

    /// The outbox must hold at least one record.
    #[error("outbox_capacity must be at least 1")]
    ZeroOutboxCapacity,

    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config document is not valid YAML for this schema.
    #[error("failed to parse config {origin}: {source}")]
    Parse {
        /// File path, or `<inline>` for string input.
        origin: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

/// Policy for the presence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Consecutive ticks an identity may be absent before its interval is
    /// closed. Absent for exactly this many ticks closes on that tick.
    pub max_miss_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_miss_threshold: DEFAULT_MAX_MISS_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    /// Builder: set the miss threshold.
    pub fn with_max_miss_threshold(mut self, threshold: u32) -> Self {
        self.max_miss_threshold = threshold;
        self
    }

    /// Reject values the state machine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_miss_threshold == 0 {
            return Err(ConfigError::ZeroThreshold(self.max_miss_threshold));
        }
        Ok(())
    }
}

/// Delivery and pacing settings for the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Maximum records held while the recorder is failing. When reached,
    /// the loop stops taking ticks until delivery makes room.
    pub outbox_capacity: usize,
    /// Pause between ticks. `0` runs as fast as the source produces.
    pub tick_interval_ms: u64,
    /// Pause between delivery attempts while the outbox is saturated.
    pub retry_delay_ms: u64,
    /// Close every open interval when the loop stops.
    pub close_open_on_stop: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            tick_interval_ms: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            close_open_on_stop: false,
        }
    }
}

impl LoopConfig {
    /// Pacing between ticks, if any.
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }

    /// Pause between saturated-outbox delivery attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::ZeroOutboxCapacity);
        }
        Ok(())
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceConfig {
    /// State-machine policy.
    pub tracker: TrackerConfig,
    /// Tick loop settings.
    pub runtime: LoopConfig,
}

impl PresenceConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>".to_string())
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path.display().to_string())
    }

    fn parse(content: &str, origin: String) -> Result<Self, ConfigError> {
        // An empty or comment-only file deserializes as YAML null.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Option<Self>>(content)
                .map_err(|source| ConfigError::Parse { origin, source })?
                .unwrap_or_default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = PresenceConfig::default();
        assert_eq!(config.tracker.max_miss_threshold, 5);
        assert_eq!(config.runtime.outbox_capacity, 1024);
        assert!(config.runtime.tick_interval().is_none());
        assert!(!config.runtime.close_open_on_stop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(PresenceConfig::from_yaml_str("").unwrap(), PresenceConfig::default());
        assert_eq!(
            PresenceConfig::from_yaml_str("# nothing here\n").unwrap(),
            PresenceConfig::default()
        );
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = PresenceConfig::from_yaml_str(
            "tracker:\n  max_miss_threshold: 8\nruntime:\n  tick_interval_ms: 40\n",
        )
        .unwrap();
        assert_eq!(config.tracker.max_miss_threshold, 8);
        assert_eq!(config.runtime.tick_interval(), Some(Duration::from_millis(40)));
        assert_eq!(config.runtime.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);
    }

    #[test]
    fn zero_threshold_rejected() {
        let err = PresenceConfig::from_yaml_str("tracker:\n  max_miss_threshold: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroThreshold(0)));
    }

    #[test]
    fn zero_outbox_rejected() {
        let err = PresenceConfig::from_yaml_str("runtime:\n  outbox_capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroOutboxCapacity));
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = PresenceConfig::from_yaml_str("tracker:\n  tolerance: 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PresenceConfig::from_yaml_file(Path::new("/nonexistent/presence.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/presence.yaml"));
    }
}
