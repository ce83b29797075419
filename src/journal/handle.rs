//! Journal handle and writer task
//!
//! ```text
//! Callers ─→ [mpsc channel] ─→ Writer Task ─→ SegmentStore ─→ write_all ─→ fsync
//!                                   │
//!                          one command at a time, in receipt order
//! ```
//!
//! `write()` enqueues its command before returning the future, so two writes
//! issued one after the other are appended in that order even if the caller
//! never awaits the first.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::config::JournalConfig;
use super::errors::{JournalError, JournalResult};
use super::record::{JournalEntry, MessageId, RecordType};
use super::store::{JournalStats, Recovery, SegmentStore};
use crate::fault::FaultMonitor;
use crate::observability::PipelineMetrics;

/// Commands sent to the journal writer task
enum JournalCmd {
    /// Append one record and reply once it is durable
    Write {
        entry: JournalEntry,
        reply: oneshot::Sender<JournalResult<()>>,
    },

    /// Snapshot of the segment list
    Stats(oneshot::Sender<JournalStats>),

    /// Stop accepting commands; everything queued before this is processed
    Close(oneshot::Sender<()>),
}

/// Handle to an open journal.
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct Journal {
    cmd_tx: mpsc::UnboundedSender<JournalCmd>,
    directory: PathBuf,
}

impl std::fmt::Debug for JournalCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalCmd::Write { entry, .. } => f
                .debug_struct("Write")
                .field("message_id", &entry.message_id)
                .field("record_type", &entry.record_type)
                .finish(),
            JournalCmd::Stats(_) => f.write_str("Stats"),
            JournalCmd::Close(_) => f.write_str("Close"),
        }
    }
}

impl Journal {
    /// Open the journal and start its writer task.
    ///
    /// Returns the messages that must be resent and the highest message id
    /// found on disk.
    pub async fn open(
        config: &JournalConfig,
        fault: FaultMonitor,
        metrics: Arc<PipelineMetrics>,
    ) -> JournalResult<(Self, Recovery)> {
        let (store, recovery) = SegmentStore::open(config, metrics).await?;
        Ok((Self::start(store, fault), recovery))
    }

    /// Start the writer task over an already opened store
    pub(crate) fn start(store: SegmentStore, fault: FaultMonitor) -> Self {
        let directory = store.directory().to_path_buf();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let writer = JournalWriter { store, fault };
        tokio::spawn(writer.run(cmd_rx));

        Self { cmd_tx, directory }
    }

    /// Directory holding the segment files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write a record.
    ///
    /// The command is queued immediately; the returned future resolves once
    /// the record is durable. `payload` is only used for SENDING records.
    pub fn write(
        &self,
        message_id: MessageId,
        record_type: RecordType,
        payload: Option<Value>,
    ) -> impl Future<Output = JournalResult<()>> + Send + 'static {
        let entry = match record_type {
            RecordType::Sending => {
                JournalEntry::sending(message_id, payload.unwrap_or(Value::Null))
            }
            completion => JournalEntry::completion(message_id, completion),
        };

        let (reply, rx) = oneshot::channel();
        let queued = self
            .cmd_tx
            .send(JournalCmd::Write { entry, reply })
            .is_ok();

        async move {
            if !queued {
                return Err(JournalError::Closed);
            }
            rx.await.unwrap_or(Err(JournalError::Closed))
        }
    }

    /// Snapshot of the segment list
    pub async fn stats(&self) -> JournalResult<JournalStats> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(JournalCmd::Stats(tx))
            .map_err(|_| JournalError::Closed)?;
        rx.await.map_err(|_| JournalError::Closed)
    }

    /// Close the journal once every previously queued write has completed.
    ///
    /// Closing an already-closed journal is a no-op.
    pub async fn close(&self) -> JournalResult<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(JournalCmd::Close(tx)).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}

/// Single owner of the segment store
struct JournalWriter {
    store: SegmentStore,
    fault: FaultMonitor,
}

impl JournalWriter {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<JournalCmd>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                JournalCmd::Write { entry, reply } => {
                    let result = self.write(entry).await;
                    let _ = reply.send(result);
                }
                JournalCmd::Stats(reply) => {
                    let _ = reply.send(self.store.stats());
                }
                JournalCmd::Close(reply) => {
                    info!(
                        directory = %self.store.directory().display(),
                        open_messages = self.store.open_messages(),
                        "Journal closed"
                    );
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    async fn write(&mut self, entry: JournalEntry) -> JournalResult<()> {
        if self.fault.is_tripped() {
            return Err(JournalError::Faulted);
        }

        let message_id = entry.message_id;
        let record_type = entry.record_type;
        let result = self.store.write(entry).await;

        if let Err(e) = &result {
            if e.is_fatal() {
                error!(
                    message_id,
                    record_type = record_type.as_str(),
                    error = %e,
                    "Fatal journal error"
                );
                self.fault.trip(e.clone());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::RetryPolicy;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_journal(dir: &Path) -> (Journal, Recovery, FaultMonitor) {
        let fault = FaultMonitor::new();
        let config = JournalConfig::new(dir).with_segment_sizes(10_000, 10_000);
        let (journal, recovery) = Journal::open(&config, fault.clone(), Arc::new(PipelineMetrics::new()))
            .await
            .unwrap();
        (journal, recovery, fault)
    }

    #[tokio::test]
    async fn test_writes_are_applied_in_issue_order() {
        let dir = TempDir::new().unwrap();
        let (journal, _, _) = open_journal(dir.path()).await;

        // Completion issued before the SENDING write is awaited
        let sending = journal.write(1, RecordType::Sending, Some(json!({"n": 1})));
        let delivered = journal.write(1, RecordType::Delivered, None);

        sending.await.unwrap();
        delivered.await.unwrap();

        assert_eq!(journal.stats().await.unwrap().open_messages, 0);
        journal.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let (journal, _, _) = open_journal(dir.path()).await;

        journal.close().await.unwrap();
        let err = journal
            .write(1, RecordType::Sending, Some(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Closed));
        assert!(journal.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_faulted_journal_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let (journal, _, fault) = open_journal(dir.path()).await;

        fault.trip(JournalError::CorruptLayout("test".into()));
        let err = journal
            .write(1, RecordType::Sending, Some(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Faulted));
    }

    #[tokio::test]
    async fn test_exhausted_retries_trip_fault() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path())
            .with_segment_sizes(10_000, 10_000)
            .with_retry(RetryPolicy::no_retry());
        let (mut store, _) = SegmentStore::open(&config, Arc::new(PipelineMetrics::new()))
            .await
            .unwrap();
        store.fail_next_appends(1);

        let fault = FaultMonitor::new();
        let journal = Journal::start(store, fault.clone());

        let err = journal
            .write(1, RecordType::Sending, Some(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::RetriesExhausted { attempts: 1, .. }));
        assert!(fault.is_tripped());

        // The append would succeed now, but the journal stays faulted
        let err = journal
            .write(2, RecordType::Sending, Some(json!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Faulted));
        assert_eq!(journal.stats().await.unwrap().segments[0].size, 0);
    }

    #[tokio::test]
    async fn test_failed_rotation_trips_fault() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path()).with_segment_sizes(0, 10);
        let fault = FaultMonitor::new();
        let (journal, _) = Journal::open(&config, fault.clone(), Arc::new(PipelineMetrics::new()))
            .await
            .unwrap();
        std::fs::write(dir.path().join("log1.data"), b"").unwrap();

        // The first record already exceeds the max segment size
        let err = journal
            .write(1, RecordType::Sending, Some(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::SegmentMaintenance { sequence: 1, .. }));
        assert!(fault.is_tripped());
    }

    #[tokio::test]
    async fn test_unknown_completion_does_not_fault() {
        let dir = TempDir::new().unwrap();
        let (journal, _, fault) = open_journal(dir.path()).await;

        let err = journal
            .write(5, RecordType::NotDelivered, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::UnknownMessage(5)));
        assert!(!fault.is_tripped());
    }
}
