//! Lockfile credentials for the League Client local API.
//!
//! The client writes a `lockfile` into its install directory on startup:
//!
//! ```text
//! LeagueClient:23472:54823:Wn1wBqkY3vJ2oA5CwE7m-Q:https
//! ```
//!
//! The five fields are, in order: process name, pid, port, auth token and
//! protocol. [`Credentials`] is the parsed, validated form of that line.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{LockfileError, LockfileResult};

/// Name of the file the client writes into its install directory.
pub const LOCKFILE_NAME: &str = "lockfile";

/// Fixed principal used for Basic auth against the local API.
pub const AUTH_USERNAME: &str = "riot";

/// The local API only listens on loopback.
pub const LOCAL_HOST: &str = "127.0.0.1";

// ============================================================================
// Protocol
// ============================================================================

/// Transport protocol advertised in the lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Returns the lockfile spelling of the protocol.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Websocket scheme matching this transport.
    pub fn websocket_scheme(self) -> &'static str {
        match self {
            Self::Http => "ws",
            Self::Https => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = LockfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(LockfileError::InvalidProtocol {
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Connection credentials of one running client process.
///
/// Values are immutable: a restarted client produces a new `Credentials`
/// rather than an updated one. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    process_name: String,
    pid: u32,
    port: u16,
    token: String,
    protocol: Protocol,
}

impl Credentials {
    /// Creates credentials from already validated parts.
    ///
    /// Returns `None` for a zero pid or port, which no live client can have.
    pub fn new(
        process_name: impl Into<String>,
        pid: u32,
        port: u16,
        token: impl Into<String>,
        protocol: Protocol,
    ) -> Option<Self> {
        if pid == 0 || port == 0 {
            return None;
        }
        Some(Self {
            process_name: process_name.into(),
            pid,
            port,
            token: token.into(),
            protocol,
        })
    }

    /// Parses the content of a lockfile.
    ///
    /// Trailing whitespace is ignored. Anything other than exactly five
    /// fields, a non-numeric or zero pid/port, or an unknown protocol is
    /// rejected.
    pub fn parse_lockfile(content: &str) -> LockfileResult<Self> {
        let fields: Vec<&str> = content.trim_end().split(':').collect();
        let [name, pid, port, token, protocol] = fields.as_slice() else {
            return Err(LockfileError::FieldCount {
                found: fields.len(),
            });
        };

        let pid = pid
            .parse::<u32>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| LockfileError::InvalidPid {
                value: (*pid).to_string(),
            })?;
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| LockfileError::InvalidPort {
                value: (*port).to_string(),
            })?;
        let protocol = protocol.parse::<Protocol>()?;

        Ok(Self {
            process_name: (*name).to_string(),
            pid,
            port,
            token: (*token).to_string(),
            protocol,
        })
    }

    /// Renders the credentials back into lockfile form.
    pub fn to_lockfile(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.process_name, self.pid, self.port, self.token, self.protocol
        )
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The secret auth token. Avoid logging this.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Value of the `Authorization` header for the local API.
    pub fn basic_auth(&self) -> String {
        let raw = format!("{AUTH_USERNAME}:{}", self.token);
        format!("Basic {}", STANDARD.encode(raw))
    }

    /// Address of the event stream, with the token embedded as userinfo.
    pub fn websocket_url(&self) -> String {
        format!(
            "{}://{AUTH_USERNAME}:{}@{LOCAL_HOST}:{}",
            self.protocol.websocket_scheme(),
            self.token,
            self.port
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("process_name", &self.process_name)
            .field("pid", &self.pid)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lockfile())
    }
}

impl FromStr for Credentials {
    type Err = LockfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lockfile(s)
    }
}
