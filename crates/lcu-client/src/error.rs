//! Error types for the LCU client.
//!
//! All error types use `thiserror` for derive macros. Resolution failures
//! of any cause (process absent, lockfile unreadable, lockfile malformed)
//! share the single `ProcessNotFound` kind; the message carries the detail.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;

use lcu_core::LockfileError;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors surfaced by credential resolution, the lifecycle manager and the
/// event stream connector.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The client process could not be located or its lockfile could not
    /// be read or parsed.
    ///
    /// Returned by `resolve()`; never retried inside the resolver.
    #[error("League Client could not be located: {0}")]
    ProcessNotFound(String),

    /// The credentials handed to the lifecycle manager do not belong to a
    /// running process.
    ///
    /// Fatal at `start()`. Callers typically resolve fresh credentials and
    /// build a new manager later.
    #[error("League Client process is not running")]
    ClientNotFound,

    /// The event stream could not be opened or the handshake failed.
    #[error("Failed to connect to event stream: {0}")]
    Connection(String),

    /// A frame from the event stream could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error passthrough.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LockfileError> for ClientError {
    fn from(error: LockfileError) -> Self {
        Self::ProcessNotFound(format!("malformed lockfile: {error}"))
    }
}

impl From<lcu_protocol::ParseError> for ClientError {
    fn from(error: lcu_protocol::ParseError) -> Self {
        Self::Protocol(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(error.to_string())
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Tests
// ============================================================================
