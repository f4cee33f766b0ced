//! Channel message types.
//!
//! Inbound frames are JSON objects carrying a `type` discriminator. Each topic
//! decodes them into its own tagged enum implementing [`Envelope`]; control
//! frames (`pong`, `connection_established`) are recognized here and never
//! reach the router.

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::error::ChannelError;

/// A typed inbound message for one topic.
///
/// Implementors are `#[serde(tag = "type")]` enums; `kind()` maps each variant
/// to a fieldless discriminant used as the routing key.
pub trait Envelope: DeserializeOwned + Send + Sync + 'static {
    /// Routing key.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns the routing key for this envelope.
    fn kind(&self) -> Self::Kind;

    /// Maps a legacy wire name to its canonical `type`, if it has one.
    fn canonical_type(_raw: &str) -> Option<&'static str> {
        None
    }
}

/// Control frames consumed by the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Keepalive reply.
    Pong,
    /// Server greeting after the handshake.
    ConnectionEstablished,
}

impl ControlFrame {
    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "pong" => Some(Self::Pong),
            "connection_established" => Some(Self::ConnectionEstablished),
            _ => None,
        }
    }
}

/// A parsed inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound<E> {
    /// Connection-level control frame.
    Control(ControlFrame),
    /// Topic event for the router.
    Event(E),
}

/// Parses a text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object with a string `type`, or
/// if its fields do not match the topic's envelope.
pub fn parse_inbound<E: Envelope>(text: &str) -> Result<Inbound<E>, ChannelError> {
    let mut value: Value = serde_json::from_str(text)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ChannelError::Deserialization("missing type field".to_string()))?;

    if let Some(control) = ControlFrame::from_type(kind) {
        return Ok(Inbound::Control(control));
    }

    if let Some(canonical) = E::canonical_type(kind) {
        if let Some(object) = value.as_object_mut() {
            object.insert("type".to_string(), Value::from(canonical));
        }
    }

    Ok(Inbound::Event(serde_json::from_value(value)?))
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive.
    Ping,
    /// Scope the feed to a company.
    SubscribeCompany {
        /// Company identifier.
        company_id: String,
    },
    /// Drop a company scope.
    UnsubscribeCompany {
        /// Company identifier.
        company_id: String,
    },
    /// Scope the dashboard feed to an account.
    SubscribeAccount {
        /// Account identifier.
        account_id: String,
    },
    /// Chat typing indicator.
    Typing {
        /// Whether the operator is typing.
        is_typing: bool,
    },
    /// Chat read receipt.
    Read {
        /// Message identifier.
        message_id: String,
    },
}

impl ClientMessage {
    /// Serializes the message to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum TestEvent {
        Created { id: u32 },
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Created,
        Unknown,
    }

    impl Envelope for TestEvent {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            match self {
                Self::Created { .. } => TestKind::Created,
                Self::Unknown => TestKind::Unknown,
            }
        }

        fn canonical_type(raw: &str) -> Option<&'static str> {
            match raw {
                "thing.created" => Some("created"),
                _ => None,
            }
        }
    }

    #[test]
    fn test_parse_event() {
        let parsed = parse_inbound::<TestEvent>(r#"{"type":"created","id":7}"#).expect("parse");
        match parsed {
            Inbound::Event(event) => assert_eq!(event, TestEvent::Created { id: 7 }),
            Inbound::Control(_) => panic!("unexpected control frame"),
        }
    }

    #[test]
    fn test_parse_canonicalizes_legacy_name() {
        let parsed = parse_inbound::<TestEvent>(r#"{"type":"thing.created","id":1}"#).expect("parse");
        assert!(matches!(parsed, Inbound::Event(TestEvent::Created { id: 1 })));
    }

    #[test]
    fn test_parse_control_frames() {
        let parsed = parse_inbound::<TestEvent>(r#"{"type":"pong"}"#).expect("parse");
        assert!(matches!(parsed, Inbound::Control(ControlFrame::Pong)));

        let parsed =
            parse_inbound::<TestEvent>(r#"{"type":"connection_established","user":1}"#).expect("parse");
        assert!(matches!(
            parsed,
            Inbound::Control(ControlFrame::ConnectionEstablished)
        ));
    }

    #[test]
    fn test_parse_unknown_type() {
        let parsed = parse_inbound::<TestEvent>(r#"{"type":"something_else"}"#).expect("parse");
        assert!(matches!(parsed, Inbound::Event(TestEvent::Unknown)));
    }

    #[test]
    fn test_parse_failures() {
        assert!(parse_inbound::<TestEvent>("not json").is_err());
        assert!(parse_inbound::<TestEvent>(r#"{"id":1}"#).is_err());
        assert!(parse_inbound::<TestEvent>(r#"{"type":42}"#).is_err());
        assert!(parse_inbound::<TestEvent>(r#"{"type":"created","id":"x"}"#).is_err());
    }

    #[test]
    fn test_client_message_ping_serialize() {
        let json = ClientMessage::Ping.to_json().expect("serialize");
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_client_message_company_serialize() {
        let msg = ClientMessage::SubscribeCompany {
            company_id: "c-1".to_string(),
        };
        let json = msg.to_json().expect("serialize");
        assert_eq!(json, r#"{"type":"subscribe_company","company_id":"c-1"}"#);

        let msg = ClientMessage::UnsubscribeCompany {
            company_id: "c-1".to_string(),
        };
        let json = msg.to_json().expect("serialize");
        assert!(json.contains("\"type\":\"unsubscribe_company\""));
    }

    #[test]
    fn test_client_message_chat_serialize() {
        let json = ClientMessage::Typing { is_typing: true }.to_json().expect("serialize");
        assert_eq!(json, r#"{"type":"typing","is_typing":true}"#);

        let json = ClientMessage::Read {
            message_id: "m1".to_string(),
        }
        .to_json()
        .expect("serialize");
        assert_eq!(json, r#"{"type":"read","message_id":"m1"}"#);
    }
}
