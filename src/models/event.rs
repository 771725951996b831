//! Transport channel events
//!
//! Every frame on the channel is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use super::message::MessagePayload;
use crate::error::ValidationError;

/// The two ends of a typing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub sender: String,
    pub receiver: String,
}

impl Participants {
    pub fn new(sender: &str, receiver: &str) -> Self {
        Self {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_pair(&self.sender, &self.receiver)
    }
}

/// Read receipt.
///
/// On `mark_read`, `sender` is the author of the messages and `receiver` the
/// reader. On `message_read` the relay swaps them: `sender` is the reader and
/// `receiver` the author. An empty `ids` list acknowledges everything the
/// author sent in the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub sender: String,
    pub receiver: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

impl ReadReceipt {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_pair(&self.sender, &self.receiver)
    }
}

fn validate_pair(sender: &str, receiver: &str) -> Result<(), ValidationError> {
    if sender.is_empty() {
        return Err(ValidationError::MissingField("sender"));
    }
    if receiver.is_empty() {
        return Err(ValidationError::MissingField("receiver"));
    }
    Ok(())
}

/// Events a client emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(MessagePayload),
    Typing(Participants),
    StopTyping(Participants),
    MarkRead(ReadReceipt),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop_typing",
            ClientEvent::MarkRead(_) => "mark_read",
        }
    }

    /// The user performing the action: the author of a message or typing
    /// notification, or the reader of a receipt.
    pub fn actor(&self) -> &str {
        match self {
            ClientEvent::SendMessage(m) => &m.sender,
            ClientEvent::Typing(p) | ClientEvent::StopTyping(p) => &p.sender,
            ClientEvent::MarkRead(r) => &r.receiver,
        }
    }
}

/// Events the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(MessagePayload),
    UserTyping(Participants),
    UserStopTyping(Participants),
    MessageRead(ReadReceipt),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
            ServerEvent::MessageRead(_) => "message_read",
        }
    }
}

/// Semantic checks applied after a frame decodes.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for ClientEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ClientEvent::SendMessage(m) => m.validate(),
            ClientEvent::Typing(p) | ClientEvent::StopTyping(p) => p.validate(),
            ClientEvent::MarkRead(r) => r.validate(),
        }
    }
}

impl Validate for ServerEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ServerEvent::ReceiveMessage(m) => m.validate(),
            // stop notifications clear whatever is shown, the payload is informational
            ServerEvent::UserStopTyping(_) => Ok(()),
            ServerEvent::UserTyping(p) => p.validate(),
            ServerEvent::MessageRead(r) => r.validate(),
        }
    }
}
