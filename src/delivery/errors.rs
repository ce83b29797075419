//! Delivery error types

use thiserror::Error;

use crate::error::Severity;
use crate::journal::MessageId;

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Delivery errors
///
/// A message the transport fails to deliver is not an error: droppable
/// messages resolve `false`, mandatory ones are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The transport acknowledged a message out of send order
    #[error("Transport protocol violation for message {message_id}: {reason}")]
    ProtocolViolation { message_id: MessageId, reason: String },

    /// Retry backoff settings are unusable
    #[error("Invalid delivery configuration: {0}")]
    InvalidConfig(String),

    /// The queue closed before the message was delivered
    #[error("Delivery queue is closed")]
    Closed,

    /// The queue stopped after a fatal error
    #[error("Delivery queue is faulted")]
    Faulted,
}

impl DeliveryError {
    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            DeliveryError::ProtocolViolation { .. } => Severity::Fatal,
            DeliveryError::InvalidConfig(_) => Severity::Error,
            DeliveryError::Closed => Severity::Error,
            DeliveryError::Faulted => Severity::Fatal,
        }
    }

    /// Returns true if this error must stop the whole pipeline
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
