//! Outbound protocol messages.

use serde::ser::{Serialize, SerializeTuple, Serializer};

/// Topic carrying every JSON API event the client publishes.
pub const JSON_API_EVENT_TOPIC: &str = "OnJsonApiEvent";

/// WAMP 1.0 message opcodes used by the local API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Welcome = 0,
    Prefix = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
    Subscribe = 5,
    Unsubscribe = 6,
    Publish = 7,
    Event = 8,
}

impl OpCode {
    /// Maps a raw opcode to its variant.
    pub fn from_u64(value: u64) -> Option<Self> {
        let op = match value {
            0 => Self::Welcome,
            1 => Self::Prefix,
            2 => Self::Call,
            3 => Self::CallResult,
            4 => Self::CallError,
            5 => Self::Subscribe,
            6 => Self::Unsubscribe,
            7 => Self::Publish,
            8 => Self::Event,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Messages sent from the client to the local API.
///
/// Serializes to the two-element array form, e.g. `[5,"OnJsonApiEvent"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start receiving events published on a topic
    Subscribe { topic: String },

    /// Stop receiving events published on a topic
    Unsubscribe { topic: String },
}

impl ClientMessage {
    /// Creates a subscribe message.
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
        }
    }

    /// Creates an unsubscribe message.
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::Unsubscribe {
            topic: topic.into(),
        }
    }

    /// The handshake sent once after the stream opens: all JSON API events.
    pub fn json_api_subscription() -> Self {
        Self::subscribe(JSON_API_EVENT_TOPIC)
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Subscribe { .. } => OpCode::Subscribe,
            Self::Unsubscribe { .. } => OpCode::Unsubscribe,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Subscribe { topic } | Self::Unsubscribe { topic } => topic,
        }
    }

    /// Serializes the message to its JSON text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.opcode().as_u8())?;
        tuple.serialize_element(self.topic())?;
        tuple.end()
    }
}
