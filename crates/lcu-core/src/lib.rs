//! LCU Core - Shared types for League Client connections
//!
//! This crate provides the domain types shared between the wire
//! protocol crate (`lcu-protocol`) and the runtime (`lcu-client`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod credentials;
pub mod error;

// Re-exports for convenience
pub use credentials::{Credentials, Protocol, AUTH_USERNAME, LOCAL_HOST, LOCKFILE_NAME};
pub use error::{LockfileError, LockfileResult};
