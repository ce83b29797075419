//! Delivery subsystem for courier
//!
//! Drives messages to the master through a [`Transport`] in arrival order,
//! honouring the transport's backpressure. Mandatory messages are retried
//! until delivered; droppable messages may resolve `false`.

mod config;
mod errors;
mod queue;
mod transport;

pub use config::DeliveryConfig;
pub use errors::{DeliveryError, DeliveryResult};
pub use queue::{DeliveryQueue, DeliveryTicket, QueueStats};
pub use transport::{DrainSignal, SendOutcome, Transport};
