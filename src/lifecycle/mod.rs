//! Message lifecycle for courier
//!
//! Assigns message ids, starts delivery and persistence side by side, and
//! closes each journaled message with a completion record once its
//! delivery settles.

mod coordinator;
mod message;
mod submission;

pub use coordinator::Coordinator;
pub use message::{Message, SendOptions, SendStatus};
pub use submission::Submission;
