//! Shared test utilities: scripted transports and journal helpers
//!
//! Real filesystem (TempDir), no mocks below the transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::delivery::{DrainSignal, SendOutcome, Transport};
use courier::journal::{data_filename, parse_segment_filename, Journal, JournalConfig, Recovery};
use courier::{FaultMonitor, Message, MessageId};
use courier::observability::PipelineMetrics;
use futures_util::future::{self, FutureExt};
use tempfile::TempDir;
use tokio::sync::oneshot;

// =============================================================================
// Transports
// =============================================================================

/// Acknowledges every message as delivered as soon as it is sent
#[derive(Default)]
pub struct InstantTransport {
    sent: Mutex<Vec<MessageId>>,
    drain: Mutex<Option<DrainSignal>>,
}

impl InstantTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<MessageId> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for InstantTransport {
    fn attach(&self, drained: DrainSignal) {
        *self.drain.lock().unwrap() = Some(drained);
    }

    fn is_open(&self) -> bool {
        true
    }

    fn send(&self, message: &Message) -> SendOutcome {
        self.sent.lock().unwrap().push(message.id);
        SendOutcome::Accepted(future::ready(true).boxed())
    }
}

/// Transport whose connection state, capacity and acknowledgements are
/// driven by the test
pub struct ManualTransport {
    open: AtomicBool,
    capacity: AtomicUsize,
    sent: Mutex<Vec<MessageId>>,
    acks: Mutex<HashMap<MessageId, oneshot::Sender<bool>>>,
    drain: Mutex<Option<DrainSignal>>,
}

impl ManualTransport {
    pub fn new(open: bool, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(open),
            capacity: AtomicUsize::new(capacity),
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(HashMap::new()),
            drain: Mutex::new(None),
        })
    }

    /// Every send so far, in order, including resends
    pub fn sent(&self) -> Vec<MessageId> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent and not yet acknowledged
    pub fn outstanding(&self) -> usize {
        self.acks.lock().unwrap().len()
    }

    /// Acknowledge one outstanding message
    pub fn ack(&self, id: MessageId, delivered: bool) {
        let tx = self
            .acks
            .lock()
            .unwrap()
            .remove(&id)
            .unwrap_or_else(|| panic!("message {} is not outstanding", id));
        tx.send(delivered).unwrap();
    }

    /// Connect and signal the queue
    pub fn connect(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.drained();
    }

    pub fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::SeqCst);
    }

    pub fn drained(&self) {
        if let Some(signal) = self.drain.lock().unwrap().as_ref() {
            signal.drained();
        }
    }

    /// Wait until at least `count` sends happened
    pub async fn wait_sent(&self, count: usize) {
        wait_until(|| self.sent.lock().unwrap().len() >= count).await;
    }
}

impl Transport for ManualTransport {
    fn attach(&self, drained: DrainSignal) {
        *self.drain.lock().unwrap() = Some(drained);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, message: &Message) -> SendOutcome {
        let mut acks = self.acks.lock().unwrap();
        if !self.is_open() || acks.len() >= self.capacity.load(Ordering::SeqCst) {
            return SendOutcome::NotReady;
        }

        let (tx, rx) = oneshot::channel();
        acks.insert(message.id, tx);
        self.sent.lock().unwrap().push(message.id);
        SendOutcome::Accepted(rx.map(|delivered| delivered.unwrap_or(false)).boxed())
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Poll `condition` until it holds; fails the test after one second
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 1s");
}

// =============================================================================
// Journal Helpers
// =============================================================================

pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

pub fn journal_config(dir: &Path, min: u64, max: u64) -> JournalConfig {
    JournalConfig::new(dir).with_segment_sizes(min, max)
}

pub async fn open_journal(config: &JournalConfig) -> (Journal, Recovery) {
    Journal::open(config, FaultMonitor::new(), Arc::new(PipelineMetrics::new()))
        .await
        .expect("Failed to open journal")
}

/// Data segment sequence numbers on disk, ascending
pub fn data_segments(dir: &Path) -> Vec<u64> {
    let mut sequences: Vec<u64> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name();
            match parse_segment_filename(name.to_str()?) {
                Some((sequence, courier::journal::SegmentFileKind::Data)) => Some(sequence),
                _ => None,
            }
        })
        .collect();
    sequences.sort_unstable();
    sequences
}

/// Ignore markers on disk
pub fn ignore_markers(dir: &Path) -> Vec<u64> {
    let mut sequences: Vec<u64> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name();
            match parse_segment_filename(name.to_str()?) {
                Some((sequence, courier::journal::SegmentFileKind::Ignore)) => Some(sequence),
                _ => None,
            }
        })
        .collect();
    sequences.sort_unstable();
    sequences
}

pub fn segment_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(data_filename(sequence))
}
