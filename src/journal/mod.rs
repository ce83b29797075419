//! Journal subsystem for courier
//!
//! A segmented, crash-safe write-ahead log of message states. A message is
//! journaled as SENDING when submitted and closed by a DELIVERED or
//! NOT_DELIVERED completion record once delivery settles. Messages without a
//! completion record are handed back for resend when the journal reopens.
//!
//! # Design Principles
//!
//! - Durability over throughput
//! - Explicit failure over silent recovery
//!
//! # Invariants Enforced
//!
//! - fsync before acknowledgment, directory fsync after every structural change
//! - Completion records live in the segment holding their SENDING record
//! - Segments are deleted oldest first, behind a crash-safe ignore marker
//! - Halt on corruption: undecodable records are never skipped

mod config;
mod errors;
mod handle;
mod inspect;
mod record;
mod segment;
mod store;

pub use config::{
    JournalConfig, RetryPolicy, SegmentBounds, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_MIN_SEGMENT_SIZE,
};
pub use errors::{JournalError, JournalResult};
pub use handle::Journal;
pub use inspect::{inspect, JournalReport, SegmentReport};
pub use record::{JournalEntry, MessageId, RecordType};
pub use segment::{data_filename, ignore_filename, parse_segment_filename, SegmentFileKind};
pub use store::{JournalStats, RecoveredMessage, Recovery, SegmentInfo, SegmentStore};
