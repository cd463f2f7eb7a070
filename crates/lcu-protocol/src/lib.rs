//! LCU Protocol - Wire protocol for the client event stream
//!
//! The local API speaks a WAMP 1.0 flavoured protocol over a websocket:
//! every frame is a JSON array whose first element is an opcode. This
//! crate builds the outbound subscription frames and parses inbound
//! event frames into typed [`ApiEvent`]s.

pub mod message;
pub mod parse;

pub use message::{ClientMessage, OpCode, JSON_API_EVENT_TOPIC};
pub use parse::{ApiEvent, EventType, ParseError, ServerMessage};
