//! Pipeline-wide error types
//!
//! Each subsystem owns its own error enum. `PipelineError` is what the
//! coordinator, the fault monitor and the CLI hand back to the owning server.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::journal::JournalError;

/// Severity levels for pipeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, pipeline continues
    Error,
    /// Pipeline must stop and the owning server must shut down
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the delivery pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The pipeline has been closed and accepts no new messages
    #[error("Pipeline is closed")]
    Closed,

    /// An earlier fatal error stopped the pipeline
    #[error("Pipeline is faulted: {0}")]
    Faulted(Arc<PipelineError>),
}

impl PipelineError {
    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::Journal(e) => e.severity(),
            PipelineError::Delivery(e) => e.severity(),
            PipelineError::Config(_) => Severity::Error,
            PipelineError::Closed => Severity::Error,
            PipelineError::Faulted(_) => Severity::Fatal,
        }
    }

    /// Returns true if this error must stop the whole pipeline
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Get error code for CLI and log output
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Journal(JournalError::DirectoryFlush { .. }) => "COURIER_DIRECTORY_FLUSH",
            PipelineError::Journal(JournalError::Corruption { .. })
            | PipelineError::Journal(JournalError::CorruptLayout(_)) => "COURIER_JOURNAL_CORRUPTION",
            PipelineError::Journal(_) => "COURIER_JOURNAL_IO",
            PipelineError::Delivery(DeliveryError::ProtocolViolation { .. }) => {
                "COURIER_TRANSPORT_PROTOCOL_VIOLATION"
            }
            PipelineError::Delivery(_) => "COURIER_DELIVERY",
            PipelineError::Config(_) => "COURIER_CONFIG",
            PipelineError::Closed => "COURIER_CLOSED",
            PipelineError::Faulted(_) => "COURIER_FAULTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Fatal.to_string(), "FATAL");
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let err = PipelineError::from(DeliveryError::ProtocolViolation {
            message_id: 3,
            reason: "delivered out of order".into(),
        });
        assert!(err.is_fatal());
        assert_eq!(err.code(), "COURIER_TRANSPORT_PROTOCOL_VIOLATION");
    }

    #[test]
    fn test_closed_is_not_fatal() {
        assert!(!PipelineError::Closed.is_fatal());
        assert!(!PipelineError::from(JournalError::Closed).is_fatal());
    }

    #[test]
    fn test_faulted_wraps_cause() {
        let cause = PipelineError::from(JournalError::CorruptLayout("gap".into()));
        let err = PipelineError::Faulted(Arc::new(cause));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("gap"));
    }
}
