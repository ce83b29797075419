//! Delivery queue
//!
//! ```text
//! enqueue ─→ [mpsc channel] ─→ Queue Task ─→ Transport::send
//!                                  ↑                │
//!                                  └── in-flight ←──┘
//!                                      acknowledgements
//! ```
//!
//! One task owns the queue. Sends are pipelined; acknowledgements are
//! polled by the same task, so every state change happens in one place.
//!
//! # Rules
//!
//! - Only the head of the queue may be acknowledged as delivered; anything
//!   else breaks the transport contract and faults the pipeline
//! - A droppable message that fails is removed and resolves `false`
//! - A mandatory message that fails stays queued; once all in-flight sends
//!   settle, the queue re-flushes from the head after a backoff
//! - `NotReady` pauses dispatch until the transport signals drained

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::DeliveryConfig;
use super::errors::{DeliveryError, DeliveryResult};
use super::transport::{DrainSignal, SendOutcome, Transport};
use crate::fault::FaultMonitor;
use crate::journal::MessageId;
use crate::lifecycle::Message;
use crate::observability::PipelineMetrics;

/// Commands sent to the queue task
pub(crate) enum QueueCmd {
    Enqueue {
        message: Message,
        reply: oneshot::Sender<DeliveryResult<bool>>,
    },
    Drained,
    Stats(oneshot::Sender<QueueStats>),
    Close(oneshot::Sender<()>),
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Messages not yet resolved, including those in flight
    pub queued: usize,
    pub in_flight: usize,
    /// Waiting for the transport to drain
    pub paused: bool,
    /// A mandatory message failed; waiting to re-flush from the head
    pub retrying: bool,
    pub faulted: bool,
}

// ============================================================================
// Ticket
// ============================================================================

/// Outcome of one enqueued message.
///
/// Resolves `Ok(true)` once delivered, `Ok(false)` if a droppable message
/// was dropped, or an error if the queue closed or faulted first.
#[derive(Debug)]
pub struct DeliveryTicket {
    state: TicketState,
}

#[derive(Debug)]
enum TicketState {
    Ready(Option<DeliveryResult<bool>>),
    Pending(oneshot::Receiver<DeliveryResult<bool>>),
}

impl DeliveryTicket {
    fn ready(result: DeliveryResult<bool>) -> Self {
        Self {
            state: TicketState::Ready(Some(result)),
        }
    }

    /// True if the message entered the queue; false if it was resolved
    /// on the spot (dropped, closed or faulted)
    pub fn is_queued(&self) -> bool {
        matches!(self.state, TicketState::Pending(_))
    }
}

impl Future for DeliveryTicket {
    type Output = DeliveryResult<bool>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            TicketState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(DeliveryError::Closed)))
            }
            TicketState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(DeliveryError::Closed))),
        }
    }
}

// ============================================================================
// Queue Handle
// ============================================================================

/// Handle to the delivery queue task
pub struct DeliveryQueue {
    cmd_tx: mpsc::UnboundedSender<QueueCmd>,
    transport: Arc<dyn Transport>,
    fault: FaultMonitor,
    metrics: Arc<PipelineMetrics>,
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("transport_open", &self.transport.is_open())
            .finish_non_exhaustive()
    }
}

impl DeliveryQueue {
    /// Start the queue task and attach the drain signal to the transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
        fault: FaultMonitor,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        transport.attach(DrainSignal::new(cmd_tx.clone()));

        let task = QueueTask {
            transport: Arc::clone(&transport),
            config,
            fault: fault.clone(),
            metrics: Arc::clone(&metrics),
            items: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            paused: false,
            retrying: false,
            retry_round: 0,
            retry_at: None,
            faulted: false,
            closing: false,
            commands_open: true,
            close_waiters: Vec::new(),
        };
        tokio::spawn(task.run(cmd_rx));

        Self {
            cmd_tx,
            transport,
            fault,
            metrics,
        }
    }

    /// Queue a message for delivery.
    ///
    /// A droppable message is dropped on the spot while the transport is
    /// closed; the ticket then resolves `false` without entering the queue.
    pub fn enqueue(&self, message: Message) -> DeliveryTicket {
        if self.fault.is_tripped() {
            return DeliveryTicket::ready(Err(DeliveryError::Faulted));
        }

        if !message.must_deliver && !self.transport.is_open() {
            debug!(message_id = message.id, "Transport closed, dropping message");
            self.metrics.increment_messages_dropped();
            return DeliveryTicket::ready(Ok(false));
        }

        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(QueueCmd::Enqueue { message, reply })
            .is_err()
        {
            return DeliveryTicket::ready(Err(DeliveryError::Closed));
        }

        DeliveryTicket {
            state: TicketState::Pending(rx),
        }
    }

    /// Snapshot of the queue state
    pub async fn stats(&self) -> DeliveryResult<QueueStats> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(QueueCmd::Stats(tx))
            .map_err(|_| DeliveryError::Closed)?;
        rx.await.map_err(|_| DeliveryError::Closed)
    }

    /// Stop dispatching and wait for in-flight sends to settle.
    ///
    /// Messages still queued afterwards resolve with `Closed`. Closing an
    /// already-closed queue is a no-op.
    pub async fn close(&self) -> DeliveryResult<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(QueueCmd::Close(tx)).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}

// ============================================================================
// Queue Task
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemState {
    /// Not yet handed to the transport (or reset for a re-flush)
    Queued,
    InFlight,
    /// Mandatory message the transport failed to deliver
    Failed,
}

struct QueueItem {
    message: Message,
    state: ItemState,
    reply: oneshot::Sender<DeliveryResult<bool>>,
}

impl QueueItem {
    fn resolve(self, result: DeliveryResult<bool>) {
        let _ = self.reply.send(result);
    }
}

/// Single owner of the queued items
struct QueueTask {
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    fault: FaultMonitor,
    metrics: Arc<PipelineMetrics>,
    /// Arrival order; index 0 is the head
    items: VecDeque<QueueItem>,
    in_flight: FuturesUnordered<BoxFuture<'static, (MessageId, bool)>>,
    paused: bool,
    retrying: bool,
    /// Consecutive re-flushes without a successful delivery
    retry_round: u32,
    retry_at: Option<Instant>,
    faulted: bool,
    closing: bool,
    commands_open: bool,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl QueueTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<QueueCmd>) {
        loop {
            if self.closing && self.in_flight.is_empty() {
                break;
            }

            let retry_at = self.retry_at;
            let retry_timer = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            let fault = self.fault.clone();

            tokio::select! {
                biased;

                Some((message_id, delivered)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.settle(message_id, delivered);
                }
                cmd = cmd_rx.recv(), if self.commands_open => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        self.commands_open = false;
                        self.closing = true;
                    }
                },
                _ = retry_timer, if retry_at.is_some() => self.restart(),
                _ = fault.wait(), if !self.faulted => self.enter_fault(),
                else => break,
            }
        }

        self.finish_close();
    }

    fn handle(&mut self, cmd: QueueCmd) {
        match cmd {
            QueueCmd::Enqueue { message, reply } => {
                if self.faulted {
                    let _ = reply.send(Err(DeliveryError::Faulted));
                    return;
                }
                if self.closing {
                    let _ = reply.send(Err(DeliveryError::Closed));
                    return;
                }
                self.items.push_back(QueueItem {
                    message,
                    state: ItemState::Queued,
                    reply,
                });
                self.dispatch();
            }
            QueueCmd::Drained => {
                if self.paused {
                    self.paused = false;
                    debug!(queued = self.items.len(), "Transport drained, resuming delivery");
                    self.dispatch();
                }
            }
            QueueCmd::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            QueueCmd::Close(reply) => {
                if !self.closing {
                    info!(
                        queued = self.items.len(),
                        in_flight = self.in_flight.len(),
                        "Closing delivery queue"
                    );
                }
                self.closing = true;
                self.close_waiters.push(reply);
            }
        }
    }

    /// Hand every undispatched message to the transport, in order
    fn dispatch(&mut self) {
        if self.paused || self.retrying || self.closing || self.faulted {
            return;
        }

        for item in self
            .items
            .iter_mut()
            .filter(|item| item.state == ItemState::Queued)
        {
            match self.transport.send(&item.message) {
                SendOutcome::NotReady => {
                    self.paused = true;
                    self.metrics.increment_transport_not_ready();
                    debug!(message_id = item.message.id, "Transport not ready, pausing delivery");
                    break;
                }
                SendOutcome::Accepted(ack) => {
                    item.state = ItemState::InFlight;
                    let message_id = item.message.id;
                    self.in_flight
                        .push(ack.map(move |delivered| (message_id, delivered)).boxed());
                }
            }
        }
    }

    /// Act on one acknowledgement from the transport
    fn settle(&mut self, message_id: MessageId, delivered: bool) {
        let Some(position) = self
            .items
            .iter()
            .position(|item| item.message.id == message_id && item.state == ItemState::InFlight)
        else {
            warn!(message_id, "Acknowledgement for a message not in flight");
            return;
        };

        if self.faulted {
            if let Some(item) = self.items.remove(position) {
                item.resolve(Err(DeliveryError::Faulted));
            }
            return;
        }

        if delivered {
            if position != 0 || self.retrying {
                self.reject_out_of_order(message_id, position);
                return;
            }

            if let Some(item) = self.items.pop_front() {
                item.resolve(Ok(true));
            }
            self.metrics.increment_messages_delivered();
            self.retry_round = 0;
            self.dispatch();
            return;
        }

        if self.items[position].message.must_deliver {
            self.items[position].state = ItemState::Failed;
            if !self.retrying {
                warn!(
                    message_id,
                    in_flight = self.in_flight.len(),
                    "Mandatory message not delivered, will re-flush from queue head"
                );
            }
            self.retrying = true;
        } else if let Some(item) = self.items.remove(position) {
            debug!(message_id, "Droppable message not delivered");
            self.metrics.increment_messages_dropped();
            item.resolve(Ok(false));
        }

        if !self.retrying {
            self.dispatch();
        } else if self.in_flight.is_empty() {
            self.schedule_retry();
        }
    }

    fn reject_out_of_order(&mut self, message_id: MessageId, position: usize) {
        let reason = if position != 0 {
            format!("acknowledged as delivered at queue position {}", position)
        } else {
            "acknowledged as delivered after a later message failed".to_string()
        };
        let violation = DeliveryError::ProtocolViolation { message_id, reason };

        error!(message_id, position, error = %violation, "Transport broke acknowledgement order");
        self.fault.trip(violation.clone());

        if let Some(item) = self.items.remove(position) {
            item.resolve(Err(violation));
        }
        self.enter_fault();
    }

    fn schedule_retry(&mut self) {
        self.retry_round = self.retry_round.saturating_add(1);
        let delay = self.config.backoff(self.retry_round);
        self.retry_at = Some(Instant::now() + delay);
        debug!(
            round = self.retry_round,
            delay_ms = delay.as_millis() as u64,
            "Delivery re-flush scheduled"
        );
    }

    /// Re-flush from the head after a failed mandatory delivery
    fn restart(&mut self) {
        self.retry_at = None;
        self.retrying = false;
        for item in self.items.iter_mut() {
            if item.state == ItemState::Failed {
                item.state = ItemState::Queued;
            }
        }

        self.metrics.increment_delivery_retries();
        info!(
            queued = self.items.len(),
            round = self.retry_round,
            "Re-flushing delivery queue from head"
        );
        self.dispatch();
    }

    /// Stop dispatching and fail everything not in flight
    fn enter_fault(&mut self) {
        if self.faulted {
            return;
        }
        self.faulted = true;
        self.retrying = false;
        self.retry_at = None;

        let (in_flight, idle): (VecDeque<_>, VecDeque<_>) = self
            .items
            .drain(..)
            .partition(|item| item.state == ItemState::InFlight);
        self.items = in_flight;

        warn!(
            failed = idle.len(),
            in_flight = self.items.len(),
            "Delivery queue stopped after fault"
        );
        for item in idle {
            item.resolve(Err(DeliveryError::Faulted));
        }
    }

    fn finish_close(mut self) {
        let remaining = self.items.len();
        for item in self.items.drain(..) {
            item.resolve(Err(DeliveryError::Closed));
        }

        info!(remaining, "Delivery queue closed");
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.items.len(),
            in_flight: self.in_flight.len(),
            paused: self.paused,
            retrying: self.retrying,
            faulted: self.faulted,
        }
    }
}
