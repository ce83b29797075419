//! Pipeline metrics
//!
//! - Counters only, monotonic, reset only on process start
//! - Thread-safe, lock-free (Relaxed ordering; exactness per counter only)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the journal, delivery queue and coordinator
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Total bytes appended to journal segments
    journal_bytes_written: AtomicU64,
    /// Total journal records appended
    journal_records_written: AtomicU64,
    /// Append attempts that failed and were retried
    journal_retries: AtomicU64,
    /// Segment rotations
    segments_rotated: AtomicU64,
    /// Segments removed by the deletion protocol
    segments_deleted: AtomicU64,
    /// Messages submitted by callers
    messages_submitted: AtomicU64,
    /// Messages acknowledged by the master
    messages_delivered: AtomicU64,
    /// Droppable messages discarded
    messages_dropped: AtomicU64,
    /// Times the transport signalled no capacity
    transport_not_ready: AtomicU64,
    /// Re-flushes from the queue head after a failed mandatory delivery
    delivery_retries: AtomicU64,
}

impl PipelineMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Journal metrics

    pub fn add_journal_bytes(&self, bytes: u64) {
        self.journal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_journal_records(&self) {
        self.journal_records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_journal_retries(&self) {
        self.journal_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_segments_rotated(&self) {
        self.segments_rotated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_segments_deleted(&self) {
        self.segments_deleted.fetch_add(1, Ordering::Relaxed);
    }

    // Delivery metrics

    pub fn increment_messages_submitted(&self) {
        self.messages_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transport_not_ready(&self) {
        self.transport_not_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_retries(&self) {
        self.delivery_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            journal_bytes: self.journal_bytes_written.load(Ordering::Relaxed),
            journal_records: self.journal_records_written.load(Ordering::Relaxed),
            journal_retries: self.journal_retries.load(Ordering::Relaxed),
            segments_rotated: self.segments_rotated.load(Ordering::Relaxed),
            segments_deleted: self.segments_deleted.load(Ordering::Relaxed),
            messages_submitted: self.messages_submitted.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            transport_not_ready: self.transport_not_ready.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub journal_bytes: u64,
    pub journal_records: u64,
    pub journal_retries: u64,
    pub segments_rotated: u64,
    pub segments_deleted: u64,
    pub messages_submitted: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub transport_not_ready: u64,
    pub delivery_retries: u64,
}
