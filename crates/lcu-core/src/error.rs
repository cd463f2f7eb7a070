//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while parsing lockfile content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockfileError {
    /// The content did not split into exactly five `:`-separated fields
    #[error("expected 5 lockfile fields, found {found}")]
    FieldCount { found: usize },

    /// The pid field is not a positive integer
    #[error("invalid pid: {value:?}")]
    InvalidPid { value: String },

    /// The port field is not an integer in 1..=65535
    #[error("invalid port: {value:?}")]
    InvalidPort { value: String },

    /// The protocol field is neither `http` nor `https`
    #[error("invalid protocol: {value:?} (expected http or https)")]
    InvalidProtocol { value: String },
}

/// Result type for lockfile parsing.
pub type LockfileResult<T> = Result<T, LockfileError>;
