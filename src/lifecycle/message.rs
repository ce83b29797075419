//! Messages and send options

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::journal::MessageId;

/// A message on its way to the master. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub payload: Value,
    /// Droppable messages may be discarded while the transport is down
    pub must_deliver: bool,
}

impl Message {
    pub fn new(id: MessageId, payload: Value, must_deliver: bool) -> Self {
        Self {
            id,
            payload,
            must_deliver,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-message send options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default = "default_true")]
    pub must_deliver: bool,
    /// Journal the message; ignored when the coordinator has no journal
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            must_deliver: true,
            persist: true,
        }
    }
}

impl SendOptions {
    /// Options for a message that may be dropped while disconnected
    pub fn droppable() -> Self {
        Self {
            must_deliver: false,
            ..Self::default()
        }
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

/// What was known about a message when its submission settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendStatus {
    /// The master acknowledged the message
    pub delivered: bool,
    /// The SENDING record is durable
    pub persisted: bool,
    /// The message entered the delivery queue
    pub delivering: bool,
    /// A SENDING record was written
    pub persisting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_to_mandatory_and_persisted() {
        let options: SendOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SendOptions::default());
        assert!(options.must_deliver);
        assert!(options.persist);
    }

    #[test]
    fn test_options_explicit_values() {
        let options: SendOptions =
            serde_json::from_str(r#"{"mustDeliver": false, "persist": false}"#).unwrap();
        assert_eq!(options, SendOptions::droppable().with_persist(false));
    }
}
