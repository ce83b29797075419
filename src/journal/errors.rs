//! Journal error types
//!
//! Severity follows the halt-on-corruption policy:
//! - Append failures are retried; only exhausted retries are FATAL
//! - Directory flush failures are always FATAL (crash-safety is lost)
//! - A rotation or deletion that fails partway is FATAL (the segment list
//!   no longer matches the directory)
//! - Corrupt records or a corrupt segment layout are FATAL (no repair)

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::error::Severity;

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

/// Journal errors
#[derive(Debug, Clone, Error)]
pub enum JournalError {
    /// Append or durable flush of a segment failed
    #[error("Journal I/O failed: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// Append kept failing after every retry
    #[error("Journal write for message {message_id} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        message_id: u64,
        attempts: u32,
        #[source]
        source: Arc<io::Error>,
    },

    /// Durable flush of the journal directory failed
    #[error("Directory flush failed for {path}: {source}")]
    DirectoryFlush {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Rotation or deletion of a segment failed partway
    #[error("Journal segment {sequence} {operation} failed: {source}")]
    SegmentMaintenance {
        sequence: u64,
        operation: &'static str,
        #[source]
        source: Arc<JournalError>,
    },

    /// A segment contains a record that cannot be decoded
    #[error("Corrupt journal record in {path} at line {line}: {reason}")]
    Corruption {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// The set of segment files on disk violates the deletion protocol
    #[error("Corrupt journal layout: {0}")]
    CorruptLayout(String),

    /// Segment size bounds or retry settings are unusable
    #[error("Invalid journal configuration: {0}")]
    InvalidConfig(String),

    /// Completion record for a message with no open SENDING record
    #[error("No open SENDING record for message {0}")]
    UnknownMessage(u64),

    /// SENDING record for a message that is already open
    #[error("Message {0} already has an open SENDING record")]
    DuplicateMessage(u64),

    /// Journal writer has been closed
    #[error("Journal is closed")]
    Closed,

    /// Journal writer refused the operation after a fatal error
    #[error("Journal is faulted")]
    Faulted,
}

impl JournalError {
    /// Create an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        JournalError::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a directory flush error
    pub fn directory_flush(path: &Path, source: io::Error) -> Self {
        JournalError::DirectoryFlush {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    /// Escalate a failure during segment rotation or deletion.
    ///
    /// Errors that are already fatal pass through unchanged.
    pub fn maintenance(sequence: u64, operation: &'static str, source: JournalError) -> Self {
        if source.is_fatal() {
            return source;
        }
        JournalError::SegmentMaintenance {
            sequence,
            operation,
            source: Arc::new(source),
        }
    }

    /// Create a corruption error for a record at the given line
    pub fn corruption(path: &Path, line: u64, reason: impl Into<String>) -> Self {
        JournalError::Corruption {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            JournalError::Io { .. } => Severity::Error,
            JournalError::RetriesExhausted { .. } => Severity::Fatal,
            JournalError::DirectoryFlush { .. } => Severity::Fatal,
            JournalError::SegmentMaintenance { .. } => Severity::Fatal,
            JournalError::Corruption { .. } => Severity::Fatal,
            JournalError::CorruptLayout(_) => Severity::Fatal,
            JournalError::InvalidConfig(_) => Severity::Error,
            JournalError::UnknownMessage(_) => Severity::Error,
            JournalError::DuplicateMessage(_) => Severity::Error,
            JournalError::Closed => Severity::Error,
            JournalError::Faulted => Severity::Fatal,
        }
    }

    /// Returns true if this error must stop the whole pipeline
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
