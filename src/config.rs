//! Configuration file
//!
//! ```json
//! {
//!   "journal": {
//!     "directory": "./data/journal",
//!     "min_segment_size": 33554432,
//!     "max_segment_size": 134217728,
//!     "retry": { "max_attempts": 5, "initial_backoff_ms": 10, "max_backoff_ms": 1000 }
//!   },
//!   "delivery": { "retry_backoff_ms": 50, "max_retry_backoff_ms": 5000 }
//! }
//! ```
//!
//! Without a `journal` section messages are delivered but never persisted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::journal::JournalConfig;

/// Pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Journal settings; absent disables persistence
    #[serde(default)]
    pub journal: Option<JournalConfig>,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> PipelineResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check segment bounds, retry policy and delivery backoff
    pub fn validate(&self) -> PipelineResult<()> {
        if let Some(journal) = &self.journal {
            journal
                .validate()
                .map_err(|e| PipelineError::Config(e.to_string()))?;
        }

        self.delivery
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }
}
