//! Parsing inbound event stream frames.
//!
//! Frames are JSON arrays. The ones we care about are events:
//!
//! ```text
//! [8, "OnJsonApiEvent", {"data": {...}, "eventType": "Update", "uri": "/lol-gameflow/v1/session"}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::{OpCode, JSON_API_EVENT_TOPIC};

/// Errors produced while parsing a frame.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Frame is not valid JSON
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but not a non-empty array
    #[error("frame is not a message array")]
    NotAnArray,

    /// First element is not a known opcode
    #[error("unknown opcode: {0}")]
    UnknownOpcode(Value),

    /// A required array element is missing or has the wrong type
    #[error("missing {0} in frame")]
    MissingField(&'static str),
}

/// Kind of change an API event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// One JSON API event published by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    /// Endpoint whose resource changed, e.g. `/lol-gameflow/v1/session`
    pub uri: String,
    pub event_type: EventType,
    /// New resource state (`null` for deletions)
    #[serde(default)]
    pub data: Value,
}

impl ApiEvent {
    /// Returns true if this event was published for exactly `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.uri == path
    }
}

/// Messages received from the local API.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Session greeting sent right after the socket opens
    Welcome { session_id: String },

    /// A JSON API event published on `topic`
    Event { topic: String, event: ApiEvent },

    /// Any other well-formed frame; carried through but not interpreted
    Other { opcode: OpCode, payload: Vec<Value> },
}

impl ServerMessage {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Interprets an already decoded frame.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let Value::Array(items) = value else {
            return Err(ParseError::NotAnArray);
        };
        let mut items = items.into_iter();
        let first = items.next().ok_or(ParseError::NotAnArray)?;
        let opcode = first
            .as_u64()
            .and_then(OpCode::from_u64)
            .ok_or_else(|| ParseError::UnknownOpcode(first.clone()))?;

        match opcode {
            OpCode::Welcome => {
                let session_id = items
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or(ParseError::MissingField("session id"))?;
                Ok(Self::Welcome { session_id })
            }
            OpCode::Event => {
                let topic = items
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or(ParseError::MissingField("topic"))?;
                let payload = items.next().ok_or(ParseError::MissingField("payload"))?;
                let event: ApiEvent = serde_json::from_value(payload)?;
                Ok(Self::Event { topic, event })
            }
            other => Ok(Self::Other {
                opcode: other,
                payload: items.collect(),
            }),
        }
    }

    /// Returns the API event if this frame carries one from a JSON API topic.
    pub fn into_api_event(self) -> Option<ApiEvent> {
        match self {
            Self::Event { topic, event } if topic.starts_with(JSON_API_EVENT_TOPIC) => Some(event),
            _ => None,
        }
    }
}
