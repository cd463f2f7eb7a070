//! LCU Client - League Client discovery and connection lifecycle
//!
//! This crate provides the runtime pieces for talking to a local
//! League Client:
//! - `auth` - Credential resolver (process query + lockfile)
//! - `process` - Platform process queries and install-directory extraction
//! - `liveness` - Non-blocking "is this pid still running" probe
//! - `lifecycle` - Polling state machine emitting connect/disconnect events
//! - `stream` - Event stream connector with the subscription handshake
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  Credentials  ┌──────────────────────┐
//! │ LockfileResolver │──────────────▶│     LeagueClient     │
//! │ (ProcessQuery +  │◀──────────────│ (poll task, owns the │
//! │  lockfile read)  │  re-acquire   │  current credentials)│
//! └──────────────────┘               └──────────┬───────────┘
//!                                               │ ClientEvent
//!                                               ▼ (broadcast)
//!                                     ┌──────────────────────┐
//!                                     │     consumer code    │──▶ stream::connect()
//!                                     └──────────────────────┘
//! ```
//!
//! The lifecycle manager and the event stream are independent: the stream
//! never reconnects on its own, callers re-open it after a `Connect` event.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod auth;
pub mod error;
pub mod lifecycle;
pub mod liveness;
pub mod process;
pub mod stream;
mod tls;

pub use auth::{
    authenticate, await_credentials, read_lockfile, AuthOptions, CredentialSource, LockfileResolver,
    DEFAULT_PROCESS_NAME,
};
pub use error::{ClientError, Result};
pub use lifecycle::{ClientConfig, ClientEvent, LeagueClient, LifecycleState, DEFAULT_POLL_INTERVAL};
pub use liveness::{is_alive, Liveness, ProbeOutcome, ProcessLiveness};
pub use process::{inspect, Platform, ProcessQuery, ProcessSnapshot, SystemProcessQuery, WindowsShell};
pub use stream::{connect, connect_with, EventStream};

pub use lcu_core::{Credentials, Protocol};
pub use lcu_protocol::{ApiEvent, EventType};
