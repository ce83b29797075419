//! Segment store
//!
//! Owns the ordered list of open segments and the message-to-segment index.
//! All mutation happens through `&mut self`, so a single owner (the journal
//! writer task) serializes every append, rotation and deletion.
//!
//! # Invariants
//!
//! - Segment sequence numbers are strictly increasing; index 0 is the oldest,
//!   the last segment is the current one that receives SENDING records
//! - A completion record is written into the segment holding its SENDING record
//! - A segment is removed only when it is idle, not current, and the oldest
//! - Ignore markers only ever exist for a contiguous prefix of segments

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use super::config::{JournalConfig, RetryPolicy, SegmentBounds};
use super::errors::{JournalError, JournalResult};
use super::record::{JournalEntry, MessageId, RecordType};
use super::segment::{
    data_filename, discover, ignore_filename, remove_if_exists, sync_directory,
    write_ignore_marker, DirectoryListing, Segment, SegmentLine, SegmentReader,
};
use crate::crash_point::{maybe_crash, points};
use crate::observability::PipelineMetrics;

/// A message whose SENDING record has no completion record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredMessage {
    pub message_id: MessageId,
    pub payload: Value,
}

/// Result of opening the journal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recovery {
    /// Messages to resend, ascending by id
    pub resend_messages: Vec<RecoveredMessage>,
    /// Highest message id seen in any replayed record (0 if none)
    pub max_message_id: MessageId,
}

/// Point-in-time view of one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub sequence: u64,
    pub size: u64,
    pub open_messages: u64,
}

/// Point-in-time view of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    /// Segments oldest first; the last one is current
    pub segments: Vec<SegmentInfo>,
    /// Messages with an open SENDING record
    pub open_messages: u64,
}

/// Segment store
#[derive(Debug)]
pub struct SegmentStore {
    dir: PathBuf,
    bounds: SegmentBounds,
    retry: RetryPolicy,
    segments: VecDeque<Segment>,
    /// Open message id -> sequence of the segment holding its SENDING record
    owners: HashMap<MessageId, u64>,
    metrics: Arc<PipelineMetrics>,
}

impl SegmentStore {
    /// Open the journal directory, recovering any previous state.
    ///
    /// 1. Remove every segment covered by the highest ignore marker
    /// 2. Create a fresh current segment for new writes
    /// 3. Replay remaining segments oldest first, deleting any that are
    ///    already fully completed
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the segment bounds are unusable
    /// - `CorruptLayout` if ignore markers are not a contiguous prefix
    /// - `Corruption` if a record cannot be decoded
    /// - `DirectoryFlush` / `Io` on storage failures
    pub async fn open(
        config: &JournalConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> JournalResult<(Self, Recovery)> {
        config.validate()?;
        let bounds = config.bounds()?;
        let dir = config.directory.clone();

        fs::create_dir_all(&dir).await.map_err(|e| {
            JournalError::io(format!("Failed to create journal directory {}", dir.display()), e)
        })?;

        let listing = discover(&dir).await?;
        let remaining = clear_ignored(&dir, &listing).await?;

        let next_sequence = listing.max_sequence().map_or(0, |s| s + 1);
        let current = Segment::create(&dir, next_sequence).await?;
        sync_directory(&dir).await?;

        let mut store = Self {
            dir,
            bounds,
            retry: config.retry,
            segments: VecDeque::from([current]),
            owners: HashMap::new(),
            metrics,
        };

        let mut index: HashMap<MessageId, Value> = HashMap::new();
        let mut max_message_id = 0;

        for sequence in remaining {
            let mut segment = Segment::open(&store.dir, sequence).await?;
            store
                .replay_segment(&mut segment, &mut index, &mut max_message_id)
                .await?;

            let before_current = store.segments.len() - 1;
            store.segments.insert(before_current, segment);
            store.reclaim().await?;
        }

        let mut resend_messages: Vec<RecoveredMessage> = index
            .into_iter()
            .map(|(message_id, payload)| RecoveredMessage {
                message_id,
                payload,
            })
            .collect();
        resend_messages.sort_by_key(|m| m.message_id);

        info!(
            directory = %store.dir.display(),
            segments = store.segments.len(),
            current = next_sequence,
            resend = resend_messages.len(),
            max_message_id,
            "Journal opened"
        );

        Ok((
            store,
            Recovery {
                resend_messages,
                max_message_id,
            },
        ))
    }

    /// Replay one segment into the recovery index
    async fn replay_segment(
        &mut self,
        segment: &mut Segment,
        index: &mut HashMap<MessageId, Value>,
        max_message_id: &mut MessageId,
    ) -> JournalResult<()> {
        let mut reader = SegmentReader::open(&segment.path).await?;
        let mut records = 0u64;

        while let Some(line) = reader.next_line().await? {
            let entry = match line {
                SegmentLine::Record(entry) => entry,
                SegmentLine::Blank => continue,
                // Crash mid-append: the record was never acknowledged
                SegmentLine::Torn { offset, bytes } => {
                    warn!(
                        segment = segment.sequence,
                        offset,
                        bytes,
                        "Truncating torn record at end of segment"
                    );
                    segment.truncate(offset).await?;
                    break;
                }
            };
            records += 1;
            *max_message_id = (*max_message_id).max(entry.message_id);

            match entry.record_type {
                RecordType::Sending => {
                    if index.insert(entry.message_id, entry.payload()).is_none() {
                        self.owners.insert(entry.message_id, segment.sequence);
                        segment.open_messages += 1;
                    }
                }
                RecordType::Delivered | RecordType::NotDelivered => {
                    index.remove(&entry.message_id);
                    match self.owners.remove(&entry.message_id) {
                        Some(owner) if owner == segment.sequence => {
                            segment.open_messages = segment.open_messages.saturating_sub(1);
                        }
                        Some(owner) => {
                            if let Some(position) = self.position(owner) {
                                let owning = &mut self.segments[position];
                                owning.open_messages = owning.open_messages.saturating_sub(1);
                            }
                        }
                        None => debug!(
                            message_id = entry.message_id,
                            segment = segment.sequence,
                            "Completion record without open SENDING record"
                        ),
                    }
                }
            }
        }

        debug!(
            segment = segment.sequence,
            records,
            open_messages = segment.open_messages,
            "Segment replayed"
        );

        Ok(())
    }

    /// Directory holding the segments
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Resolved segment size bounds
    pub fn bounds(&self) -> SegmentBounds {
        self.bounds
    }

    /// Messages with an open SENDING record
    pub fn open_messages(&self) -> u64 {
        self.owners.len() as u64
    }

    /// Point-in-time view of the segment list
    pub fn stats(&self) -> JournalStats {
        JournalStats {
            segments: self
                .segments
                .iter()
                .map(|s| SegmentInfo {
                    sequence: s.sequence,
                    size: s.size,
                    open_messages: s.open_messages,
                })
                .collect(),
            open_messages: self.open_messages(),
        }
    }

    /// Make the next `count` appends to the current segment fail
    #[cfg(test)]
    pub(crate) fn fail_next_appends(&mut self, count: u32) {
        let index = self.current_index();
        self.segments[index].fail_appends = count;
    }

    fn position(&self, sequence: u64) -> Option<usize> {
        self.segments.iter().position(|s| s.sequence == sequence)
    }

    fn current_index(&self) -> usize {
        self.segments.len() - 1
    }

    /// Durably write one record.
    ///
    /// SENDING records go to the current segment; completion records go to
    /// the segment that holds the matching SENDING record. Segment
    /// maintenance runs after every write.
    ///
    /// # Errors
    ///
    /// - `DuplicateMessage` / `UnknownMessage` for records that do not match
    ///   the open message set (nothing is written)
    /// - `RetriesExhausted` (FATAL) if the append keeps failing
    /// - `DirectoryFlush` (FATAL) if rotation or deletion cannot be made durable
    /// - `SegmentMaintenance` (FATAL) if rotation or deletion fails partway
    pub async fn write(&mut self, entry: JournalEntry) -> JournalResult<()> {
        let message_id = entry.message_id;
        let bytes = entry.encode().map_err(|e| {
            JournalError::io(
                format!("Failed to encode record for message {}", message_id),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        match entry.record_type {
            RecordType::Sending => {
                if self.owners.contains_key(&message_id) {
                    return Err(JournalError::DuplicateMessage(message_id));
                }

                let index = self.current_index();
                self.append_with_retry(index, message_id, &bytes).await?;

                let segment = &mut self.segments[index];
                segment.open_messages += 1;
                self.owners.insert(message_id, segment.sequence);

                self.maintain_current().await
            }
            RecordType::Delivered | RecordType::NotDelivered => {
                let owner = *self
                    .owners
                    .get(&message_id)
                    .ok_or(JournalError::UnknownMessage(message_id))?;
                let index = self.position(owner).ok_or_else(|| {
                    JournalError::CorruptLayout(format!(
                        "segment {} owning message {} is not open",
                        owner, message_id
                    ))
                })?;

                self.append_with_retry(index, message_id, &bytes).await?;

                self.owners.remove(&message_id);
                let segment = &mut self.segments[index];
                segment.open_messages = segment.open_messages.saturating_sub(1);

                if index == self.current_index() {
                    self.maintain_current().await
                } else {
                    self.reclaim().await
                }
            }
        }
    }

    /// Append with bounded exponential backoff between attempts
    async fn append_with_retry(
        &mut self,
        index: usize,
        message_id: MessageId,
        bytes: &[u8],
    ) -> JournalResult<()> {
        let mut attempt = 1;
        loop {
            match self.segments[index].append(bytes).await {
                Ok(()) => {
                    self.metrics.add_journal_bytes(bytes.len() as u64);
                    self.metrics.increment_journal_records();
                    return Ok(());
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        message_id,
                        segment = self.segments[index].sequence,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Journal append failed, retrying"
                    );
                    self.metrics.increment_journal_retries();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(JournalError::RetriesExhausted {
                        message_id,
                        attempts: attempt,
                        source: Arc::new(e),
                    })
                }
            }
        }
    }

    /// Rotate the current segment if it has reached its size bounds
    async fn maintain_current(&mut self) -> JournalResult<()> {
        let current = &self.segments[self.current_index()];
        if self
            .bounds
            .should_rotate(current.size, current.open_messages)
        {
            self.rotate().await?;
        }
        Ok(())
    }

    /// Swap in a new current segment, then try to reclaim old ones
    async fn rotate(&mut self) -> JournalResult<()> {
        let retired = self.segments[self.current_index()].sequence;
        let retired_size = self.segments[self.current_index()].size;

        let segment = Segment::create(&self.dir, retired + 1)
            .await
            .map_err(|e| JournalError::maintenance(retired + 1, "rotation", e))?;
        sync_directory(&self.dir).await?;
        maybe_crash(points::JOURNAL_AFTER_ROTATE);

        self.segments.push_back(segment);
        self.metrics.increment_segments_rotated();
        info!(
            retired,
            retired_size,
            current = retired + 1,
            "Journal segment rotated"
        );

        self.reclaim().await
    }

    /// Delete idle segments from the front until one is ineligible
    async fn reclaim(&mut self) -> JournalResult<()> {
        while self.segments.len() > 1 && self.segments[0].is_idle() {
            let sequence = self.segments[0].sequence;
            self.delete_front()
                .await
                .map_err(|e| JournalError::maintenance(sequence, "deletion", e))?;
        }
        Ok(())
    }

    /// Crash-safe deletion of the oldest segment.
    ///
    /// Recovery treats a marker as covering its segment and everything
    /// before it, so a crash at any step leaves a state that open() finishes.
    async fn delete_front(&mut self) -> JournalResult<()> {
        let sequence = self.segments[0].sequence;
        self.segments[0].deleting = true;

        let marker = write_ignore_marker(&self.dir, sequence).await?;
        sync_directory(&self.dir).await?;
        maybe_crash(points::JOURNAL_DELETE_AFTER_MARKER);

        let Some(segment) = self.segments.pop_front() else {
            return Ok(());
        };
        let path = segment.close();

        remove_if_exists(&path).await?;
        maybe_crash(points::JOURNAL_DELETE_AFTER_UNLINK);
        sync_directory(&self.dir).await?;

        remove_if_exists(&marker).await?;

        self.metrics.increment_segments_deleted();
        info!(segment = sequence, "Journal segment deleted");
        Ok(())
    }
}

/// Remove every file covered by the highest ignore marker.
///
/// Returns the data segments that remain, ascending.
///
/// # Errors
///
/// Returns `CorruptLayout` if a data segment is older than the highest
/// marker: markers must form a contiguous prefix, and anything else needs
/// operator intervention.
async fn clear_ignored(dir: &Path, listing: &DirectoryListing) -> JournalResult<Vec<u64>> {
    let Some(&highest) = listing.ignore.iter().next_back() else {
        return Ok(listing.data.iter().copied().collect());
    };

    if let Some(&older) = listing.data.range(..highest).next() {
        return Err(JournalError::CorruptLayout(format!(
            "data segment {} is older than ignore marker {}",
            older, highest
        )));
    }

    if listing.data.contains(&highest) {
        remove_if_exists(&dir.join(data_filename(highest))).await?;
        info!(segment = highest, "Removed segment interrupted mid-deletion");
    }
    sync_directory(dir).await?;

    for &sequence in &listing.ignore {
        remove_if_exists(&dir.join(ignore_filename(sequence))).await?;
    }
    sync_directory(dir).await?;

    info!(markers = listing.ignore.len(), "Ignore markers cleared");

    Ok(listing
        .data
        .range(highest + 1..)
        .copied()
        .collect())
}
