//! Journal record format
//!
//! Each segment is a sequence of newline-delimited JSON records, one per
//! line, in append order:
//!
//! ```text
//! {"messageId":7,"type":"sending","message":{"type":"Started"}}
//! {"messageId":7,"type":"delivered"}
//! {"messageId":8,"type":"not delivered"}
//! ```
//!
//! `message` is present only on SENDING records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message identifier, monotonic per server
pub type MessageId = u64;

/// Journal record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Message has been handed to delivery
    #[serde(rename = "sending")]
    Sending,
    /// Master acknowledged receipt
    #[serde(rename = "delivered")]
    Delivered,
    /// Delivery failed and the message was dropped
    #[serde(rename = "not delivered")]
    NotDelivered,
}

impl RecordType {
    /// Returns true for DELIVERED and NOT_DELIVERED
    pub fn is_completion(&self) -> bool {
        matches!(self, RecordType::Delivered | RecordType::NotDelivered)
    }

    /// Completion record type for a delivery outcome
    pub fn completion(delivered: bool) -> Self {
        if delivered {
            RecordType::Delivered
        } else {
            RecordType::NotDelivered
        }
    }

    /// Returns the on-disk name
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Sending => "sending",
            RecordType::Delivered => "delivered",
            RecordType::NotDelivered => "not delivered",
        }
    }
}

/// A single journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub message_id: MessageId,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl JournalEntry {
    /// SENDING record carrying the payload
    pub fn sending(message_id: MessageId, payload: Value) -> Self {
        Self {
            message_id,
            record_type: RecordType::Sending,
            message: Some(payload),
        }
    }

    /// DELIVERED / NOT_DELIVERED record
    pub fn completion(message_id: MessageId, record_type: RecordType) -> Self {
        Self {
            message_id,
            record_type,
            message: None,
        }
    }

    /// Encodes the record as one newline-terminated line
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decodes one line (without its trailing newline)
    pub fn decode(line: &str) -> Result<Self, String> {
        serde_json::from_str(line).map_err(|e| e.to_string())
    }

    /// Payload of a SENDING record; a `null` or missing payload reads as `Null`
    pub fn payload(&self) -> Value {
        self.message.clone().unwrap_or(Value::Null)
    }
}
