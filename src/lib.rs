//! courier - crash-safe, order-preserving delivery of worker results
//!
//! A worker reports results to a remote master over an unreliable
//! transport. courier guarantees at-least-once, in-order delivery of
//! mandatory messages across process crashes:
//!
//! - [`journal`]: segmented write-ahead log of message states
//! - [`delivery`]: ordered, backpressure-aware dispatch to the transport
//! - [`lifecycle`]: id assignment and the delivery/persistence race
//!
//! A fatal error anywhere trips the shared [`fault::FaultMonitor`]; the
//! owning server should then shut down.

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod delivery;
pub mod error;
pub mod fault;
pub mod journal;
pub mod lifecycle;
pub mod observability;

pub use config::Config;
pub use delivery::{DeliveryConfig, DrainSignal, SendOutcome, Transport};
pub use error::{PipelineError, PipelineResult, Severity};
pub use fault::FaultMonitor;
pub use journal::{Journal, JournalConfig, MessageId, RecoveredMessage, Recovery};
pub use lifecycle::{Coordinator, Message, SendOptions, SendStatus, Submission};
