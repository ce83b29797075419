//! Observability for courier
//!
//! - Structured logs through `tracing` (JSON, one event per line)
//! - Monotonic counters in `PipelineMetrics`
//!
//! Library code only emits events; installing a subscriber is the binary's
//! job (`init_tracing`).

mod metrics;

pub use metrics::{MetricsSnapshot, PipelineMetrics};

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info";

/// Install the process-wide JSON log subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Safe to call multiple times;
/// subsequent calls are no-ops.
pub fn init_tracing(default_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(None);
        init_tracing(Some("debug"));
        tracing::info!(check = true, "tracing initialised twice");
    }
}
