//! Journal crash scenarios
//!
//! - Crash before an append: the record is lost, nothing else is
//! - Crash after fsync: the record survives
//! - Crash anywhere in rotation or deletion: recovery finishes the job

use std::path::Path;

use courier::crash_point::points;
use courier::journal::Recovery;

use crate::common::{create_temp_dir, data_segments, ignore_markers, journal_config, open_journal};
use crate::crash::crash_at;

// =============================================================================
// Test Utilities
// =============================================================================

async fn recover(dir: &Path) -> Recovery {
    let (journal, recovery) = open_journal(&journal_config(dir, 0, 1000)).await;
    journal.close().await.unwrap();
    recovery
}

fn resend_ids(recovery: &Recovery) -> Vec<u64> {
    recovery.resend_messages.iter().map(|m| m.message_id).collect()
}

// =============================================================================
// Append Path
// =============================================================================

#[tokio::test]
async fn test_crash_before_append_loses_first_record() {
    let temp_dir = create_temp_dir();
    crash_at(points::JOURNAL_BEFORE_APPEND, temp_dir.path());

    let recovery = recover(temp_dir.path()).await;
    assert!(recovery.resend_messages.is_empty());
    assert_eq!(recovery.max_message_id, 0);
    assert!(ignore_markers(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_crash_before_fsync_never_corrupts() {
    let temp_dir = create_temp_dir();
    crash_at(points::JOURNAL_BEFORE_FSYNC, temp_dir.path());

    // The unsynced record may or may not have reached the disk
    let recovery = recover(temp_dir.path()).await;
    let ids = resend_ids(&recovery);
    assert!(ids.is_empty() || ids == vec![1], "unexpected resend set {:?}", ids);
}

#[tokio::test]
async fn test_crash_after_fsync_preserves_record() {
    let temp_dir = create_temp_dir();
    crash_at(points::JOURNAL_AFTER_FSYNC, temp_dir.path());

    let recovery = recover(temp_dir.path()).await;
    assert_eq!(resend_ids(&recovery), vec![1]);
    assert_eq!(recovery.max_message_id, 1);
    assert_eq!(recovery.resend_messages[0].payload, serde_json::json!({"n": 1}));
}

// =============================================================================
// Rotation and Deletion
// =============================================================================

#[tokio::test]
async fn test_crash_after_rotate_reclaims_idle_segment() {
    let temp_dir = create_temp_dir();
    let dir = temp_dir.path();
    crash_at(points::JOURNAL_AFTER_ROTATE, dir);
    assert_eq!(data_segments(dir), vec![0, 1]);

    let recovery = recover(dir).await;
    assert!(recovery.resend_messages.is_empty());
    assert_eq!(recovery.max_message_id, 2);
    assert_eq!(data_segments(dir), vec![2]);
}

#[tokio::test]
async fn test_crash_after_marker_finishes_deletion() {
    let temp_dir = create_temp_dir();
    let dir = temp_dir.path();
    crash_at(points::JOURNAL_DELETE_AFTER_MARKER, dir);
    assert_eq!(data_segments(dir), vec![0, 1]);
    assert_eq!(ignore_markers(dir), vec![0]);

    let recovery = recover(dir).await;
    assert!(recovery.resend_messages.is_empty());
    // Records in the ignored segment are not replayed
    assert_eq!(recovery.max_message_id, 0);
    assert_eq!(data_segments(dir), vec![2]);
    assert!(ignore_markers(dir).is_empty());
}

#[tokio::test]
async fn test_crash_after_unlink_clears_marker() {
    let temp_dir = create_temp_dir();
    let dir = temp_dir.path();
    crash_at(points::JOURNAL_DELETE_AFTER_UNLINK, dir);
    assert_eq!(data_segments(dir), vec![1]);
    assert_eq!(ignore_markers(dir), vec![0]);

    let recovery = recover(dir).await;
    assert!(recovery.resend_messages.is_empty());
    assert_eq!(data_segments(dir), vec![2]);
    assert!(ignore_markers(dir).is_empty());
}

#[test]
fn test_every_crash_point_has_a_scenario() {
    assert_eq!(points::all().len(), 6);
}
