//! Chat topic events.

use serde::Deserialize;
use serde_json::Value;

use super::lenient;
use crate::channel::Envelope;

/// Envelopes pushed on `chat/{account}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message arrived in a conversation.
    MessageReceived {
        /// Message record as sent by the server.
        #[serde(default)]
        message: Value,
    },
    /// A contact started or stopped typing.
    Typing {
        /// Contact phone number.
        #[serde(default, deserialize_with = "lenient::id")]
        phone_number: Option<String>,
        /// Whether the contact is typing.
        #[serde(default, deserialize_with = "lenient::flag")]
        is_typing: bool,
    },
    /// Unrecognized type.
    #[serde(other)]
    Unknown,
}

/// Routing key for [`ChatEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatEventKind {
    /// `message_received`.
    MessageReceived,
    /// `typing`.
    Typing,
    /// Anything else.
    Unknown,
}

impl ChatEvent {
    /// Returns the conversation a received message belongs to.
    ///
    /// The server sends either a conversation ID or an embedded conversation.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        let Self::MessageReceived { message } = self else {
            return None;
        };
        match message.get("conversation")? {
            Value::String(id) => Some(id.as_str()),
            other => other.get("id")?.as_str(),
        }
    }
}

impl Envelope for ChatEvent {
    type Kind = ChatEventKind;

    fn kind(&self) -> ChatEventKind {
        match self {
            Self::MessageReceived { .. } => ChatEventKind::MessageReceived,
            Self::Typing { .. } => ChatEventKind::Typing,
            Self::Unknown => ChatEventKind::Unknown,
        }
    }
}
