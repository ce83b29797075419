//! Journal configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{JournalError, JournalResult};

/// Default minimum segment size before an idle segment is rotated (32 MiB)
pub const DEFAULT_MIN_SEGMENT_SIZE: u64 = 32 * 1024 * 1024;

/// Default maximum segment size before a segment is always rotated (128 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 128 * 1024 * 1024;

/// Journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory holding the segment files
    pub directory: PathBuf,

    /// Rotate an idle segment once it reaches this size
    #[serde(default)]
    pub min_segment_size: Option<u64>,

    /// Always rotate a segment once it reaches this size
    #[serde(default)]
    pub max_segment_size: Option<u64>,

    /// Retry policy for failed appends
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl JournalConfig {
    /// Config with default bounds and retry policy
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            min_segment_size: None,
            max_segment_size: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Set both segment size bounds
    pub fn with_segment_sizes(mut self, min: u64, max: u64) -> Self {
        self.min_segment_size = Some(min);
        self.max_segment_size = Some(max);
        self
    }

    /// Set the append retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve and validate the segment bounds
    pub fn bounds(&self) -> JournalResult<SegmentBounds> {
        SegmentBounds::resolve(self.min_segment_size, self.max_segment_size)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> JournalResult<()> {
        self.bounds()?;
        self.retry.validate()
    }
}

/// Resolved segment size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBounds {
    pub min: u64,
    pub max: u64,
}

impl Default for SegmentBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_SEGMENT_SIZE,
            max: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

impl SegmentBounds {
    /// Resolve optional bounds.
    ///
    /// A bound that is not given is derived from its default, clamped so it
    /// never crosses the bound that was given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if both are given and `min > max`, or if
    /// `max` is zero.
    pub fn resolve(min: Option<u64>, max: Option<u64>) -> JournalResult<Self> {
        let (min, max) = match (min, max) {
            (None, None) => (DEFAULT_MIN_SEGMENT_SIZE, DEFAULT_MAX_SEGMENT_SIZE),
            (Some(min), None) => (min, DEFAULT_MAX_SEGMENT_SIZE.max(min)),
            (None, Some(max)) => (DEFAULT_MIN_SEGMENT_SIZE.min(max), max),
            (Some(min), Some(max)) => (min, max),
        };

        if max == 0 {
            return Err(JournalError::InvalidConfig(
                "max_segment_size must be > 0".to_string(),
            ));
        }

        if min > max {
            return Err(JournalError::InvalidConfig(format!(
                "min_segment_size ({}) must not exceed max_segment_size ({})",
                min, max
            )));
        }

        Ok(Self { min, max })
    }

    /// Returns true if a segment of this size and open count must rotate
    pub fn should_rotate(&self, size: u64, open_messages: u64) -> bool {
        size >= self.max || (open_messages == 0 && size >= self.min)
    }
}

/// Bounded exponential backoff for failed appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay between retries
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    fn validate(&self) -> JournalResult<()> {
        if self.max_attempts == 0 {
            return Err(JournalError::InvalidConfig(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(JournalError::InvalidConfig(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}
