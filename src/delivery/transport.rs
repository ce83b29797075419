//! Transport contract
//!
//! The transport carries messages to the master. Its implementation
//! (handshake, authentication, wire encoding) lives outside this crate; the
//! delivery queue only relies on the contract below.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use super::queue::QueueCmd;
use crate::lifecycle::Message;

/// Result of handing a message to the transport
pub enum SendOutcome {
    /// The message was sent; the future resolves `true` once the master
    /// acknowledges it, `false` if it failed or may have failed.
    Accepted(BoxFuture<'static, bool>),

    /// No capacity right now. The transport must call
    /// [`DrainSignal::drained`] once it can take more.
    NotReady,
}

impl std::fmt::Debug for SendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendOutcome::Accepted(_) => f.write_str("Accepted"),
            SendOutcome::NotReady => f.write_str("NotReady"),
        }
    }
}

/// Connection to the master.
///
/// Implementations must:
/// - never panic in `send`, and resolve every accepted future
/// - acknowledge messages in the order they were sent
/// - never deliver a message after an earlier one failed
/// - return `NotReady` while disconnected, and call `drained` once
///   connected or once capacity returns
pub trait Transport: Send + Sync + 'static {
    /// Receive the drain callback; called once when the queue is created
    fn attach(&self, drained: DrainSignal);

    /// Whether a connection to the master is currently established
    fn is_open(&self) -> bool;

    /// Send one message
    fn send(&self, message: &Message) -> SendOutcome;
}

/// Handle the transport uses to tell the queue capacity has returned
#[derive(Debug, Clone)]
pub struct DrainSignal {
    cmd_tx: mpsc::UnboundedSender<QueueCmd>,
}

impl DrainSignal {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<QueueCmd>) -> Self {
        Self { cmd_tx }
    }

    /// Resume dispatch after `NotReady`.
    ///
    /// Ignored if the queue is not paused or has closed.
    pub fn drained(&self) {
        let _ = self.cmd_tx.send(QueueCmd::Drained);
    }
}
