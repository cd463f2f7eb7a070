//! Event stream tests against local websocket servers.
//!
//! Each server records the handshake it saw, then plays a scripted list of
//! frames. The plain server runs on Tokio; the TLS server presents a
//! self-signed certificate from `fixtures/` and runs on a blocking thread.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use lcu_client::{connect, connect_with, ClientError, CredentialSource, EventType};
use lcu_core::{Credentials, Protocol};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Constants
// ============================================================================

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN: &str = "secret";

const WELCOME: &str = r#"[0,"session-1",1,"test-server"]"#;
const GAMEFLOW: &str = r#"[8,"OnJsonApiEvent",{"uri":"/lol-gameflow/v1/gameflow-phase","eventType":"Update","data":"Lobby"}]"#;
const LOBBY: &str = r#"[8,"OnJsonApiEvent",{"uri":"/lol-lobby/v2/lobby","eventType":"Create","data":{"partyId":"p1"}}]"#;

// ============================================================================
// Test Server
// ============================================================================

/// What the server observed during one session.
#[derive(Debug)]
struct ServerLog {
    authorization: Option<String>,
    first_message: Option<String>,
}

/// Accepts one connection, replays `frames`, then closes.
async fn spawn_server(frames: Vec<Message>) -> (u16, JoinHandle<ServerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();

        let mut authorization = None;
        let callback = |request: &Request, response: Response| {
            authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok::<Response, ErrorResponse>(response)
        };
        let mut socket = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();

        let first_message = match socket.next().await {
            Some(Ok(Message::Text(text))) => Some(text.as_str().to_string()),
            _ => None,
        };

        for frame in frames {
            if socket.send(frame).await.is_err() {
                break;
            }
        }
        let _ = socket.close(None).await;
        while let Some(Ok(_)) = socket.next().await {}

        ServerLog {
            authorization,
            first_message,
        }
    });

    (port, handle)
}

fn tls_server_config() -> rustls::ServerConfig {
    let cert = CertificateDer::from(include_bytes!("fixtures/localhost.cert.der").to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        include_bytes!("fixtures/localhost.key.der").to_vec(),
    ));

    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap()
}

/// Accepts one TLS connection, replays `frames`, then reads until the
/// client goes away.
fn spawn_tls_server(frames: Vec<Message>) -> (u16, JoinHandle<ServerLog>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::task::spawn_blocking(move || {
        let (tcp, _) = listener.accept().unwrap();
        let connection = rustls::ServerConnection::new(Arc::new(tls_server_config())).unwrap();
        let tls = rustls::StreamOwned::new(connection, tcp);

        let mut authorization = None;
        let callback = |request: &Request, response: Response| {
            authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok::<Response, ErrorResponse>(response)
        };
        let Ok(mut socket) = tungstenite::accept_hdr(tls, callback) else {
            panic!("TLS websocket handshake failed");
        };

        let first_message = match socket.read() {
            Ok(Message::Text(text)) => Some(text.as_str().to_string()),
            _ => None,
        };

        for frame in frames {
            if socket.send(frame).is_err() {
                break;
            }
        }
        while socket.read().is_ok() {}

        ServerLog {
            authorization,
            first_message,
        }
    });

    (port, handle)
}

fn credentials(port: u16) -> Credentials {
    Credentials::new("LeagueClient", std::process::id(), port, TOKEN, Protocol::Http).unwrap()
}

/// Source for the fallback path that never finds a client.
struct Unavailable;

#[async_trait]
impl CredentialSource for Unavailable {
    async fn resolve(&self) -> lcu_client::Result<Credentials> {
        Err(ClientError::ProcessNotFound("not running".to_string()))
    }
}

/// Source for the fallback path that always returns the same credentials.
struct Fixed(Credentials);

#[async_trait]
impl CredentialSource for Fixed {
    async fn resolve(&self) -> lcu_client::Result<Credentials> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_sends_auth_and_subscription() {
    let (port, server) = spawn_server(vec![]).await;

    let stream = timeout(TEST_TIMEOUT, connect(Some(credentials(port))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stream.credentials().port(), port);
    let _ = stream.close().await;

    let log = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(log.authorization.as_deref(), Some("Basic cmlvdDpzZWNyZXQ="));
    assert_eq!(log.first_message.as_deref(), Some(r#"[5,"OnJsonApiEvent"]"#));
}

#[tokio::test]
async fn test_events_are_delivered_in_order() {
    let frames = vec![
        Message::text(WELCOME),
        Message::Ping(vec![1, 2, 3].into()),
        Message::text(GAMEFLOW),
        Message::text(LOBBY),
    ];
    let (port, server) = spawn_server(frames).await;

    let mut stream = connect(Some(credentials(port))).await.unwrap();

    let first = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.uri, "/lol-gameflow/v1/gameflow-phase");
    assert_eq!(first.event_type, EventType::Update);
    assert_eq!(first.data, "Lobby");

    let second = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.uri, "/lol-lobby/v2/lobby");
    assert_eq!(second.event_type, EventType::Create);

    let end = timeout(TEST_TIMEOUT, stream.next_event()).await.unwrap();
    assert!(end.is_none(), "server close ends the stream");

    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_path_filter() {
    let frames = vec![Message::text(GAMEFLOW), Message::text(LOBBY)];
    let (port, _server) = spawn_server(frames).await;

    let mut stream = connect(Some(credentials(port))).await.unwrap();
    stream.subscribe("/lol-lobby/v2/lobby");
    assert_eq!(stream.paths().count(), 1);

    let event = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.uri, "/lol-lobby/v2/lobby");

    assert!(stream.unsubscribe("/lol-lobby/v2/lobby"));
    assert!(!stream.unsubscribe("/lol-lobby/v2/lobby"));
}

#[tokio::test]
async fn test_malformed_frame_is_reported_and_skipped() {
    let frames = vec![Message::text("not json"), Message::text(GAMEFLOW)];
    let (port, _server) = spawn_server(frames).await;

    let mut stream = connect(Some(credentials(port))).await.unwrap();

    let bad = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(bad, Err(ClientError::Protocol(_))));

    let good = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(good.uri, "/lol-gameflow/v1/gameflow-phase");
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = connect(Some(credentials(port))).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_close_is_acknowledged() {
    let (port, server) = spawn_server(vec![Message::text(GAMEFLOW)]).await;

    let mut stream = connect(Some(credentials(port))).await.unwrap();
    let event = timeout(TEST_TIMEOUT, stream.next_event()).await.unwrap();
    assert!(matches!(event, Some(Ok(_))));
    let end = timeout(TEST_TIMEOUT, stream.next_event()).await.unwrap();
    assert!(end.is_none());

    // The stream is still alive here, so the server can only finish if the
    // close reply was already written
    let log = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server finished the close handshake")
        .unwrap();
    assert!(log.first_message.is_some());
    drop(stream);
}

#[tokio::test]
async fn test_connect_without_credentials_fails() {
    let err = connect_with(None, &Unavailable).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connect_without_credentials_uses_source() {
    let (port, server) = spawn_server(vec![]).await;

    let stream = timeout(TEST_TIMEOUT, connect_with(None, &Fixed(credentials(port))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stream.credentials().port(), port);
    let _ = stream.close().await;

    let log = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(log.first_message.as_deref(), Some(r#"[5,"OnJsonApiEvent"]"#));
}

#[tokio::test]
async fn test_connect_without_running_client_fails() {
    // No League Client runs on test hosts
    let err = connect(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_secure_stream_accepts_self_signed_certificate() {
    let (port, server) = spawn_tls_server(vec![Message::text(WELCOME), Message::text(LOBBY)]);
    let credentials =
        Credentials::new("LeagueClient", std::process::id(), port, TOKEN, Protocol::Https).unwrap();
    assert!(credentials.websocket_url().starts_with("wss://"));

    let mut stream = timeout(TEST_TIMEOUT, connect(Some(credentials)))
        .await
        .unwrap()
        .unwrap();

    let event = timeout(TEST_TIMEOUT, stream.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.uri, "/lol-lobby/v2/lobby");
    let _ = stream.close().await;

    let log = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(log.authorization.as_deref(), Some("Basic cmlvdDpzZWNyZXQ="));
    assert_eq!(log.first_message.as_deref(), Some(r#"[5,"OnJsonApiEvent"]"#));
}
