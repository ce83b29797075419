//! Segment Rotation Tests
//!
//! - The current segment rotates at max size, or at min size once idle
//! - Idle segments are deleted strictly from the front
//! - Rotation never loses a record

mod common;

use std::sync::Arc;

use common::*;
use courier::journal::RecordType;
use courier::observability::PipelineMetrics;
use courier::{FaultMonitor, Journal};
use serde_json::json;

// =============================================================================
// Test Utilities
// =============================================================================

/// Payload large enough that every SENDING record exceeds 100 bytes
fn bulky(n: u64) -> serde_json::Value {
    json!({ "n": n, "blob": "x".repeat(120) })
}

fn sequences(stats: &courier::journal::JournalStats) -> Vec<u64> {
    stats.segments.iter().map(|s| s.sequence).collect()
}

// =============================================================================
// Rotation
// =============================================================================

#[tokio::test]
async fn test_max_size_forces_rotation_and_keeps_every_record() {
    let temp_dir = create_temp_dir();
    let config = journal_config(temp_dir.path(), 1000, 1000);
    let metrics = Arc::new(PipelineMetrics::new());

    let (journal, _) = Journal::open(&config, FaultMonitor::new(), Arc::clone(&metrics))
        .await
        .unwrap();

    for id in 1..=40 {
        journal
            .write(id, RecordType::Sending, Some(bulky(id)))
            .await
            .unwrap();
    }

    let stats = journal.stats().await.unwrap();
    assert!(stats.segments.len() >= 4, "only {} segments", stats.segments.len());
    assert_eq!(stats.open_messages, 40);
    // Every retired segment reached the max before it was retired
    for segment in &stats.segments[..stats.segments.len() - 1] {
        assert!(segment.size >= 1000);
        assert!(segment.open_messages > 0);
    }
    assert_eq!(
        metrics.snapshot().segments_rotated,
        stats.segments.len() as u64 - 1
    );
    journal.close().await.unwrap();

    let (journal, recovery) = open_journal(&config).await;
    let ids: Vec<u64> = recovery.resend_messages.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, (1..=40).collect::<Vec<_>>());
    assert_eq!(recovery.resend_messages[16].payload, bulky(17));
    journal.close().await.unwrap();
}

#[tokio::test]
async fn test_idle_segment_rotates_at_min_size() {
    let temp_dir = create_temp_dir();
    let (journal, _) = open_journal(&journal_config(temp_dir.path(), 0, 1000)).await;

    journal.write(1, RecordType::Sending, Some(json!(1))).await.unwrap();
    // Still holds an open message: no rotation below max
    assert_eq!(sequences(&journal.stats().await.unwrap()), vec![0]);

    journal.write(1, RecordType::Delivered, None).await.unwrap();

    // Idle at min size: rotated, and the retired segment was reclaimed
    let stats = journal.stats().await.unwrap();
    assert_eq!(sequences(&stats), vec![1]);
    assert_eq!(stats.segments[0].size, 0);
    assert_eq!(data_segments(temp_dir.path()), vec![1]);
    assert!(ignore_markers(temp_dir.path()).is_empty());
    journal.close().await.unwrap();
}

// =============================================================================
// Deletion Order
// =============================================================================

#[tokio::test]
async fn test_idle_segment_waits_for_older_segments() {
    let temp_dir = create_temp_dir();
    let dir = temp_dir.path();
    let (journal, _) = open_journal(&journal_config(dir, 100, 100)).await;

    // Each record fills a segment on its own
    journal.write(1, RecordType::Sending, Some(bulky(1))).await.unwrap();
    journal.write(2, RecordType::Sending, Some(bulky(2))).await.unwrap();
    assert_eq!(data_segments(dir), vec![0, 1, 2]);

    journal.write(2, RecordType::Delivered, None).await.unwrap();

    // Segment 1 is idle but segment 0 still holds message 1
    let stats = journal.stats().await.unwrap();
    assert_eq!(sequences(&stats), vec![0, 1, 2]);
    assert_eq!(stats.segments[1].open_messages, 0);
    assert_eq!(data_segments(dir), vec![0, 1, 2]);

    journal.write(1, RecordType::NotDelivered, None).await.unwrap();

    assert_eq!(sequences(&journal.stats().await.unwrap()), vec![2]);
    assert_eq!(data_segments(dir), vec![2]);
    assert!(ignore_markers(dir).is_empty());
    journal.close().await.unwrap();

    let (journal, recovery) = open_journal(&journal_config(dir, 100, 100)).await;
    assert!(recovery.resend_messages.is_empty());
    assert_eq!(recovery.max_message_id, 0);
    journal.close().await.unwrap();
}

#[tokio::test]
async fn test_completion_record_lands_in_owning_segment() {
    let temp_dir = create_temp_dir();
    let dir = temp_dir.path();
    let config = journal_config(dir, 100, 100);
    let (journal, _) = open_journal(&config).await;

    journal.write(1, RecordType::Sending, Some(bulky(1))).await.unwrap();
    journal.write(2, RecordType::Sending, Some(bulky(2))).await.unwrap();
    journal.write(1, RecordType::Delivered, None).await.unwrap();
    journal.close().await.unwrap();

    // Segment 0 was reclaimed with its completion record; 2 is still open
    let (journal, recovery) = open_journal(&config).await;
    let ids: Vec<u64> = recovery.resend_messages.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, vec![2]);
    assert_eq!(recovery.max_message_id, 2);
    journal.close().await.unwrap();
}
