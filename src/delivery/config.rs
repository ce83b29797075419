//! Delivery queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{DeliveryError, DeliveryResult};

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_max_retry_backoff_ms() -> u64 {
    5_000
}

/// Backoff between re-flushes after a mandatory message fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Delay before the first re-flush
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for the doubled delay
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
        }
    }
}

impl DeliveryConfig {
    /// Re-flush immediately; for tests and local transports
    pub fn immediate() -> Self {
        Self {
            retry_backoff_ms: 0,
            max_retry_backoff_ms: 0,
        }
    }

    /// Delay before re-flush number `round` (1-based), doubling up to the cap
    pub fn backoff(&self, round: u32) -> Duration {
        let shift = round.saturating_sub(1).min(20);
        let ms = self
            .retry_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_retry_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> DeliveryResult<()> {
        if self.retry_backoff_ms > self.max_retry_backoff_ms {
            return Err(DeliveryError::InvalidConfig(format!(
                "retry_backoff_ms ({}) exceeds max_retry_backoff_ms ({})",
                self.retry_backoff_ms, self.max_retry_backoff_ms
            )));
        }
        Ok(())
    }
}
