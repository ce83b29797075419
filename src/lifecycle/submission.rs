//! Submission: the caller's view of one sent message
//!
//! Delivery and persistence run concurrently. A durable SENDING record is as
//! good as delivery for the caller: after a crash the journal resends the
//! message. So `settled` resolves on whichever side settles first.

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use super::message::SendStatus;
use crate::delivery::{DeliveryError, DeliveryResult};
use crate::error::{PipelineError, PipelineResult};
use crate::journal::{JournalResult, MessageId};

/// Pending outcome of a sent message
pub struct Submission {
    message_id: MessageId,
    delivery: Option<oneshot::Receiver<DeliveryResult<bool>>>,
    persistence: Option<BoxFuture<'static, JournalResult<()>>>,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("message_id", &self.message_id)
            .field("delivering", &self.delivery.is_some())
            .field("persisting", &self.persistence.is_some())
            .finish()
    }
}

impl Submission {
    pub(crate) fn new(
        message_id: MessageId,
        delivery: Option<oneshot::Receiver<DeliveryResult<bool>>>,
        persistence: Option<BoxFuture<'static, JournalResult<()>>>,
    ) -> Self {
        Self {
            message_id,
            delivery,
            persistence,
        }
    }

    /// Id assigned to the message
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn status(&self) -> SendStatus {
        SendStatus {
            delivering: self.delivery.is_some(),
            persisting: self.persistence.is_some(),
            ..SendStatus::default()
        }
    }

    /// Wait until the message is delivered or durably journaled.
    ///
    /// With both sides active, the first to settle decides; if one side
    /// fails the other is awaited. Fails only if every active side failed,
    /// reporting the journal error when both did.
    pub async fn settled(self) -> PipelineResult<SendStatus> {
        let mut status = self.status();

        match (self.delivery, self.persistence) {
            (None, None) => Ok(status),
            (Some(delivery), None) => {
                status.delivered = delivery_outcome(delivery.await)?;
                Ok(status)
            }
            (None, Some(persistence)) => {
                persistence.await?;
                status.persisted = true;
                Ok(status)
            }
            (Some(delivery), Some(mut persistence)) => {
                tokio::pin!(delivery);
                tokio::select! {
                    outcome = &mut delivery => match delivery_outcome(outcome) {
                        Ok(delivered) => {
                            status.delivered = delivered;
                            Ok(status)
                        }
                        Err(_) => {
                            persistence.await?;
                            status.persisted = true;
                            Ok(status)
                        }
                    },
                    persisted = &mut persistence => match persisted {
                        Ok(()) => {
                            status.persisted = true;
                            Ok(status)
                        }
                        Err(journal_error) => match delivery_outcome(delivery.await) {
                            Ok(delivered) => {
                                status.delivered = delivered;
                                Ok(status)
                            }
                            Err(_) => Err(journal_error.into()),
                        },
                    },
                }
            }
        }
    }

    /// Wait for both sides to settle and report each.
    ///
    /// Fails with the first error encountered.
    pub async fn completed(self) -> PipelineResult<SendStatus> {
        let mut status = self.status();

        if let Some(persistence) = self.persistence {
            persistence.await?;
            status.persisted = true;
        }
        if let Some(delivery) = self.delivery {
            status.delivered = delivery_outcome(delivery.await)?;
        }

        Ok(status)
    }
}

fn delivery_outcome(
    outcome: Result<DeliveryResult<bool>, oneshot::error::RecvError>,
) -> PipelineResult<bool> {
    outcome
        .unwrap_or(Err(DeliveryError::Closed))
        .map_err(PipelineError::from)
}
