//! Event stream connector.
//!
//! Opens a websocket to the client's local API and subscribes to the JSON
//! API event topic. The connection sequence is:
//!
//! ```text
//! credentials ──► wss://riot:<token>@127.0.0.1:<port>
//!                 Authorization: Basic base64("riot:<token>")
//!                 (self-signed certificate accepted)
//!             ──► send [5,"OnJsonApiEvent"]     (exactly once, on open)
//!             ──► [8,"OnJsonApiEvent",{...}]    (events, forever)
//! ```
//!
//! When no credentials are supplied, one resolution attempt is made with
//! the default [`LockfileResolver`], or the source passed to [`connect_with`];
//! its failure is reported as a connection error.
//!
//! # Panic-Free Guarantees
//!
//! Malformed frames surface as [`ClientError::Protocol`] from
//! [`EventStream::next_event`] and leave the stream usable.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use lcu_core::Credentials;
use lcu_protocol::{ApiEvent, ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::auth::{CredentialSource, LockfileResolver};
use crate::error::{ClientError, Result};
use crate::tls::local_client_config;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Connect
// ============================================================================

/// Opens the event stream and performs the subscription handshake.
///
/// With `None`, credentials are resolved once from the running client.
///
/// # Errors
///
/// Returns [`ClientError::Connection`] if no credentials could be
/// resolved, the websocket upgrade fails, or the subscription message
/// cannot be sent.
pub async fn connect(credentials: Option<Credentials>) -> Result<EventStream> {
    connect_with(credentials, &LockfileResolver::default()).await
}

/// Like [`connect`], resolving missing credentials from `source`.
pub async fn connect_with<S>(credentials: Option<Credentials>, source: &S) -> Result<EventStream>
where
    S: CredentialSource + ?Sized,
{
    let credentials = match credentials {
        Some(credentials) => credentials,
        None => source
            .resolve()
            .await
            .map_err(|e| ClientError::Connection(format!("no credentials available: {e}")))?,
    };

    EventStream::open(credentials).await
}

// ============================================================================
// Event Stream
// ============================================================================

/// An open, subscribed event stream.
///
/// The credentials it was opened with never change. After the client
/// restarts, open a new stream with the new credentials.
pub struct EventStream {
    credentials: Credentials,
    socket: Socket,
    /// Exact URIs to deliver; empty means everything
    paths: HashSet<String>,
}

impl EventStream {
    async fn open(credentials: Credentials) -> Result<Self> {
        let url = credentials.websocket_url();
        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&credentials.basic_auth())
            .map_err(|e| ClientError::Connection(format!("invalid authorization header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let tls = local_client_config()
            .map_err(|e| ClientError::Connection(format!("TLS setup failed: {e}")))?;
        let connector = Connector::Rustls(Arc::new(tls));

        let (mut socket, response) =
            connect_async_tls_with_config(request, None, false, Some(connector)).await?;
        debug!(
            port = credentials.port(),
            status = %response.status(),
            "Websocket upgraded"
        );

        let subscription = ClientMessage::json_api_subscription().to_json()?;
        socket.send(Message::text(subscription)).await?;

        info!(port = credentials.port(), "Event stream subscribed");

        Ok(Self {
            credentials,
            socket,
            paths: HashSet::new(),
        })
    }

    /// Credentials this stream was opened with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Restricts delivery to events whose URI equals `path`.
    ///
    /// Paths accumulate; with none registered every event is delivered.
    pub fn subscribe(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    /// Stops delivering events for `path`. Returns whether it was registered.
    pub fn unsubscribe(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    /// Currently registered paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    fn wants(&self, event: &ApiEvent) -> bool {
        self.paths.is_empty() || self.paths.contains(&event.uri)
    }

    /// Sends a raw protocol message on the stream.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        self.socket.send(Message::text(text)).await?;
        Ok(())
    }

    /// Waits for the next JSON API event.
    ///
    /// Pings are answered by the websocket layer; welcome frames, other
    /// topics and filtered paths are skipped. Returns `None` once the
    /// server closes the stream.
    pub async fn next_event(&mut self) -> Option<Result<ApiEvent>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    debug!(?frame, "Event stream closed by server");
                    // The close reply is queued, not sent, until the next flush
                    if let Err(e) = self.socket.flush().await {
                        debug!(error = %e, "Close reply not delivered");
                    }
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {
                    continue;
                }
            };

            let parsed = match ServerMessage::parse(text.as_str()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "Malformed frame on event stream");
                    return Some(Err(e.into()));
                }
            };

            match parsed.into_api_event() {
                Some(event) if self.wants(&event) => return Some(Ok(event)),
                Some(event) => trace!(uri = %event.uri, "Filtered event"),
                None => trace!("Skipped non-event frame"),
            }
        }
    }

    /// Closes the websocket.
    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("credentials", &self.credentials)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
