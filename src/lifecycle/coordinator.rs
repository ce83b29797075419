//! Message lifecycle coordinator
//!
//! ```text
//! send ─→ assign id ─┬─→ DeliveryQueue::enqueue ─→ ticket ─┐
//!                    └─→ Journal::write(SENDING)           │
//!                                                          ↓
//!                                  lifecycle task: await ticket,
//!                                  write DELIVERED / NOT_DELIVERED
//! ```
//!
//! Id assignment, enqueue and the SENDING write happen under one lock, so
//! queue order, journal order and id order agree. The completion record is
//! written by a per-message task that starts only after the SENDING record
//! was queued to the journal writer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, FutureExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::message::{Message, SendOptions};
use super::submission::Submission;
use crate::config::Config;
use crate::delivery::{DeliveryError, DeliveryQueue, DeliveryResult, DeliveryTicket, Transport};
use crate::error::{PipelineError, PipelineResult};
use crate::fault::FaultMonitor;
use crate::journal::{Journal, MessageId, RecordType, RecoveredMessage, Recovery};
use crate::observability::PipelineMetrics;

/// Mutable coordinator state, guarded by one lock
#[derive(Debug)]
struct State {
    /// Highest id assigned, recovered or reported by the master
    last_id: MessageId,
    closed: bool,
    /// Cloned into every lifecycle task; dropped on close
    lifecycle_tx: Option<mpsc::Sender<()>>,
}

/// Assigns ids, fans each message out to delivery and persistence, and
/// writes completion records.
#[derive(Debug)]
pub struct Coordinator {
    journal: Option<Journal>,
    queue: DeliveryQueue,
    fault: FaultMonitor,
    metrics: Arc<PipelineMetrics>,
    state: Mutex<State>,
    /// Yields `None` once every lifecycle task has finished
    lifecycle_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Coordinator {
    /// Open the journal (if configured), start the delivery queue and build
    /// a coordinator whose ids continue after the recovered maximum.
    ///
    /// The returned `Recovery` lists messages to pass to [`resend`](Self::resend).
    pub async fn open(
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> PipelineResult<(Self, Recovery)> {
        config.validate()?;

        let fault = FaultMonitor::new();
        let metrics = Arc::new(PipelineMetrics::new());

        let (journal, recovery) = match &config.journal {
            Some(journal_config) => {
                let (journal, recovery) =
                    Journal::open(journal_config, fault.clone(), Arc::clone(&metrics)).await?;
                (Some(journal), recovery)
            }
            None => (None, Recovery::default()),
        };

        let queue = DeliveryQueue::new(transport, config.delivery, fault.clone(), Arc::clone(&metrics));
        let coordinator = Self::new(journal, queue, fault, metrics);
        coordinator.observe_message_id(recovery.max_message_id);

        Ok((coordinator, recovery))
    }

    /// Build a coordinator from already-running parts.
    ///
    /// Without a journal, `persist` is ignored and nothing is journaled.
    pub fn new(
        journal: Option<Journal>,
        queue: DeliveryQueue,
        fault: FaultMonitor,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::channel(1);
        Self {
            journal,
            queue,
            fault,
            metrics,
            state: Mutex::new(State {
                last_id: 0,
                closed: false,
                lifecycle_tx: Some(lifecycle_tx),
            }),
            lifecycle_rx: tokio::sync::Mutex::new(lifecycle_rx),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Plain counters; a panic elsewhere cannot leave them inconsistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the id floor, e.g. to the last id the master reported in its
    /// handshake. The next id is greater than every observed id.
    pub fn observe_message_id(&self, message_id: MessageId) {
        let mut state = self.lock_state();
        if message_id > state.last_id {
            debug!(message_id, previous = state.last_id, "Message id floor raised");
            state.last_id = message_id;
        }
    }

    /// Highest id assigned or observed so far
    pub fn last_message_id(&self) -> MessageId {
        self.lock_state().last_id
    }

    /// Send a message.
    ///
    /// Returns once the message is queued for delivery and, when
    /// persisting, its SENDING record is queued to the journal. A droppable
    /// message sent while the transport is closed is dropped on the spot
    /// and never journaled.
    ///
    /// # Errors
    ///
    /// - `Faulted` after a fatal error anywhere in the pipeline
    /// - `Closed` after [`close`](Self::close)
    pub fn send(&self, payload: Value, options: SendOptions) -> PipelineResult<Submission> {
        self.fault.check()?;

        let mut state = self.lock_state();
        if state.closed {
            return Err(PipelineError::Closed);
        }
        let lifecycle_tx = state.lifecycle_tx.clone().ok_or(PipelineError::Closed)?;

        state.last_id += 1;
        let message_id = state.last_id;
        let message = Message::new(message_id, payload.clone(), options.must_deliver);
        let ticket = self.queue.enqueue(message);

        if !ticket.is_queued() {
            // Resolved on the spot: nothing to journal
            drop(state);
            let delivered = ticket
                .now_or_never()
                .unwrap_or(Err(DeliveryError::Closed))?;
            debug!(message_id, delivered, "Message not queued");
            return Ok(Submission::new(message_id, None, None));
        }

        let journal = match &self.journal {
            Some(journal) if options.persist => Some(journal.clone()),
            _ => None,
        };
        let persistence = journal.as_ref().map(|journal| {
            journal
                .write(message_id, RecordType::Sending, Some(payload))
                .boxed()
        });
        drop(state);

        self.metrics.increment_messages_submitted();
        let delivery = self.track(message_id, ticket, journal, lifecycle_tx);

        Ok(Submission::new(message_id, Some(delivery), persistence))
    }

    /// Re-queue messages recovered from the journal.
    ///
    /// They keep their ids, are always mandatory and get no new SENDING
    /// record; their completion records close the original one.
    pub fn resend(&self, recovered: Vec<RecoveredMessage>) -> PipelineResult<Vec<Submission>> {
        self.fault.check()?;

        let mut state = self.lock_state();
        if state.closed {
            return Err(PipelineError::Closed);
        }
        let lifecycle_tx = state.lifecycle_tx.clone().ok_or(PipelineError::Closed)?;

        let count = recovered.len();
        let mut submissions = Vec::with_capacity(count);
        for RecoveredMessage {
            message_id,
            payload,
        } in recovered
        {
            state.last_id = state.last_id.max(message_id);

            let ticket = self.queue.enqueue(Message::new(message_id, payload, true));
            let delivery = self.track(message_id, ticket, self.journal.clone(), lifecycle_tx.clone());
            let persistence = self
                .journal
                .as_ref()
                .map(|_| future::ready(Ok(())).boxed());

            submissions.push(Submission::new(message_id, Some(delivery), persistence));
        }
        drop(state);

        if count > 0 {
            info!(count, "Resending recovered messages");
        }
        Ok(submissions)
    }

    /// Spawn the task that forwards the delivery outcome and writes the
    /// completion record
    fn track(
        &self,
        message_id: MessageId,
        ticket: DeliveryTicket,
        journal: Option<Journal>,
        lifecycle_tx: mpsc::Sender<()>,
    ) -> oneshot::Receiver<DeliveryResult<bool>> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(run_lifecycle(message_id, ticket, journal, outcome_tx, lifecycle_tx));
        outcome_rx
    }

    /// Orderly shutdown.
    ///
    /// Refuses new messages, closes the delivery queue (in-flight sends
    /// settle, queued ones resolve `Closed` and stay open in the journal),
    /// waits for every completion record, then closes the journal.
    /// Closing twice is a no-op.
    pub async fn close(&self) -> PipelineResult<()> {
        let lifecycle_tx = {
            let mut state = self.lock_state();
            state.closed = true;
            state.lifecycle_tx.take()
        };
        drop(lifecycle_tx);

        self.queue.close().await?;

        {
            let mut lifecycle_rx = self.lifecycle_rx.lock().await;
            while lifecycle_rx.recv().await.is_some() {}
        }

        if let Some(journal) = &self.journal {
            journal.close().await?;
        }

        info!(last_message_id = self.last_message_id(), "Coordinator closed");
        Ok(())
    }

    /// Shared fault state; await [`FaultMonitor::wait`] to learn of fatal errors
    pub fn fault(&self) -> &FaultMonitor {
        &self.fault
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }
}

/// Lifecycle of one queued message
async fn run_lifecycle(
    message_id: MessageId,
    ticket: DeliveryTicket,
    journal: Option<Journal>,
    outcome_tx: oneshot::Sender<DeliveryResult<bool>>,
    _lifecycle_tx: mpsc::Sender<()>,
) {
    let outcome = ticket.await;
    let _ = outcome_tx.send(outcome.clone());

    let Some(journal) = journal else {
        return;
    };

    match outcome {
        Ok(delivered) => {
            let record_type = RecordType::completion(delivered);
            if let Err(e) = journal.write(message_id, record_type, None).await {
                warn!(
                    message_id,
                    record_type = record_type.as_str(),
                    error = %e,
                    "Failed to write completion record"
                );
            }
        }
        Err(e) => debug!(
            message_id,
            error = %e,
            "Delivery unresolved, message stays open in journal"
        ),
    }
}
