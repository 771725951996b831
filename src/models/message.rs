//! Message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A chat message held in conversation state.
///
/// Everything except `read` is fixed once constructed. `read` only ever goes
/// from false to true, see [`Message::mark_read`].
///
/// `client_id` is the id the sending client stamped at send time. It is the
/// only id read receipts may target. Storage ids (`_id`, `id`) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    /// Build an outbound message stamped `now`, unread, with a fresh id.
    pub fn outgoing(sender: &str, receiver: &str, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            client_id: Some(uuid::Uuid::new_v4().to_string()),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            message: text.to_string(),
            created_at: now,
            read: false,
        }
    }

    /// Flip the read flag. Returns true if it changed.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.read;
        self.read = true;
        changed
    }

    /// Whether this message was exchanged between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// Message as it arrives over the wire or from history.
///
/// `createdAt` and `read` are optional; [`MessagePayload::into_message`]
/// fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl MessagePayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sender.is_empty() {
            return Err(ValidationError::MissingField("sender"));
        }
        if self.receiver.is_empty() {
            return Err(ValidationError::MissingField("receiver"));
        }
        Ok(())
    }

    /// Convert to a stored message, defaulting `createdAt` to `now` and `read` to false.
    pub fn into_message(self, now: DateTime<Utc>) -> Message {
        Message {
            client_id: self.client_id,
            sender: self.sender,
            receiver: self.receiver,
            message: self.message,
            created_at: self.created_at.unwrap_or(now),
            read: self.read.unwrap_or(false),
        }
    }
}

impl From<Message> for MessagePayload {
    fn from(m: Message) -> Self {
        Self {
            client_id: m.client_id,
            sender: m.sender,
            receiver: m.receiver,
            message: m.message,
            created_at: Some(m.created_at),
            read: Some(m.read),
        }
    }
}
