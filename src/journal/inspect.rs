//! Read-only journal inspection
//!
//! Reports what a journal directory holds without opening it for writing:
//! no markers are cleared, no torn tails are truncated, no segment is
//! created. Used by `courier inspect`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::errors::JournalResult;
use super::record::{MessageId, RecordType};
use super::segment::{data_filename, discover, SegmentLine, SegmentReader};

/// Record counts for one data file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentReport {
    pub sequence: u64,
    pub size: u64,
    pub sending: u64,
    pub delivered: u64,
    pub not_delivered: u64,
    /// Bytes after the last complete record (crash mid-append)
    pub torn_tail_bytes: u64,
    /// Covered by an ignore marker; recovery removes it without replay
    pub ignored: bool,
}

/// Summary of a journal directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JournalReport {
    pub directory: PathBuf,
    pub segments: Vec<SegmentReport>,
    pub ignore_markers: Vec<u64>,
    /// Messages recovery would resend, ascending
    pub open_messages: Vec<MessageId>,
    pub max_message_id: MessageId,
    /// Violation of the ignore-marker prefix rule, if any
    pub layout_error: Option<String>,
}

/// Inspect a journal directory.
///
/// # Errors
///
/// Returns `Corruption` for a record that cannot be decoded and `Io` if the
/// directory or a segment cannot be read.
pub async fn inspect(dir: &Path) -> JournalResult<JournalReport> {
    let listing = discover(dir).await?;
    let highest_marker = listing.ignore.iter().next_back().copied();

    let layout_error = highest_marker.and_then(|highest| {
        listing
            .data
            .range(..highest)
            .next()
            .map(|older| format!("data segment {} is older than ignore marker {}", older, highest))
    });

    let mut report = JournalReport {
        directory: dir.to_path_buf(),
        ignore_markers: listing.ignore.iter().copied().collect(),
        layout_error,
        ..JournalReport::default()
    };

    // Open SENDING records in replay order; value is the owning segment
    let mut open: BTreeMap<MessageId, u64> = BTreeMap::new();

    for &sequence in &listing.data {
        let ignored = highest_marker.is_some_and(|highest| sequence <= highest);
        let path = dir.join(data_filename(sequence));
        let mut segment = scan_segment(&path, sequence, &mut open, &mut report.max_message_id, ignored)
            .await?;
        segment.ignored = ignored;
        report.segments.push(segment);
    }

    report.open_messages = open.into_keys().collect();
    Ok(report)
}

async fn scan_segment(
    path: &Path,
    sequence: u64,
    open: &mut BTreeMap<MessageId, u64>,
    max_message_id: &mut MessageId,
    ignored: bool,
) -> JournalResult<SegmentReport> {
    let mut reader = SegmentReader::open(path).await?;
    let mut report = SegmentReport {
        sequence,
        ..SegmentReport::default()
    };

    while let Some(line) = reader.next_line().await? {
        let entry = match line {
            SegmentLine::Record(entry) => entry,
            SegmentLine::Blank => continue,
            SegmentLine::Torn { bytes, .. } => {
                report.torn_tail_bytes = bytes;
                break;
            }
        };

        match entry.record_type {
            RecordType::Sending => report.sending += 1,
            RecordType::Delivered => report.delivered += 1,
            RecordType::NotDelivered => report.not_delivered += 1,
        }

        // Ignored segments are removed without replay
        if ignored {
            continue;
        }

        *max_message_id = (*max_message_id).max(entry.message_id);
        if entry.record_type.is_completion() {
            open.remove(&entry.message_id);
        } else {
            open.insert(entry.message_id, sequence);
        }
    }

    report.size = reader.offset() + report.torn_tail_bytes;
    Ok(report)
}
