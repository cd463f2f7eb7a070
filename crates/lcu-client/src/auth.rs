//! Credential resolution - finds the client process and reads its lockfile.
//!
//! Resolution is a straight pipeline with no retries:
//!
//! 1. query the process table for the client's command line
//! 2. extract `--install-directory=` with the platform's pattern
//! 3. read `<install-directory>/lockfile`
//! 4. parse the five lockfile fields into [`Credentials`]
//!
//! Every failure along the way is reported as
//! [`ClientError::ProcessNotFound`]. Waiting for a client that is not
//! running yet is the caller's choice, see [`authenticate`] and
//! [`await_credentials`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lcu_core::{Credentials, LOCKFILE_NAME};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::process::{extract_install_directory, ProcessQuery, SystemProcessQuery, WindowsShell};

// ============================================================================
// Configuration
// ============================================================================

/// Process name of the client UX host.
pub const DEFAULT_PROCESS_NAME: &str = "LeagueClientUx";

/// Default delay between resolution attempts when awaiting a client.
pub const DEFAULT_AUTH_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Options controlling credential resolution.
///
/// # Example
///
/// ```rust
/// use lcu_client::AuthOptions;
/// use std::time::Duration;
///
/// let options = AuthOptions {
///     await_connection: true,
///     poll_interval: Duration::from_secs(1),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Name of the process whose lockfile to read.
    pub process_name: String,

    /// Keep retrying until a client is found instead of failing at once.
    pub await_connection: bool,

    /// Delay between attempts when `await_connection` is set.
    pub poll_interval: Duration,

    /// Tool used to query the process table on Windows.
    pub windows_shell: WindowsShell,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            await_connection: false,
            poll_interval: DEFAULT_AUTH_POLL_INTERVAL,
            windows_shell: WindowsShell::default(),
        }
    }
}

// ============================================================================
// Credential Source
// ============================================================================

/// Something that can produce fresh credentials for a running client.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Attempts one resolution. Must not retry internally.
    async fn resolve(&self) -> Result<Credentials>;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    async fn resolve(&self) -> Result<Credentials> {
        (**self).resolve().await
    }
}

/// Resolves credentials from the process table and the on-disk lockfile.
#[derive(Debug, Clone)]
pub struct LockfileResolver<Q = SystemProcessQuery> {
    query: Q,
    process_name: String,
}

impl LockfileResolver<SystemProcessQuery> {
    /// Creates a resolver using the system process table.
    #[must_use]
    pub fn new(options: &AuthOptions) -> Self {
        Self::with_query(
            SystemProcessQuery::new(options.windows_shell),
            options.process_name.clone(),
        )
    }
}

impl Default for LockfileResolver<SystemProcessQuery> {
    fn default() -> Self {
        Self::new(&AuthOptions::default())
    }
}

impl<Q: ProcessQuery> LockfileResolver<Q> {
    /// Creates a resolver over a custom process query.
    #[must_use]
    pub fn with_query(query: Q, process_name: impl Into<String>) -> Self {
        Self {
            query,
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    async fn resolve_once(&self) -> Result<Credentials> {
        let command_line = self.query.command_line(&self.process_name).await?;

        let install_dir = extract_install_directory(self.query.platform(), &command_line)
            .ok_or_else(|| {
                ClientError::ProcessNotFound(format!(
                    "no running {} process with an install directory",
                    self.process_name
                ))
            })?;

        read_lockfile(&install_dir).await
    }
}

#[async_trait]
impl<Q: ProcessQuery> CredentialSource for LockfileResolver<Q> {
    async fn resolve(&self) -> Result<Credentials> {
        let credentials = self.resolve_once().await?;
        debug!(
            pid = credentials.pid(),
            port = credentials.port(),
            protocol = %credentials.protocol(),
            "Resolved client credentials"
        );
        Ok(credentials)
    }
}

/// Reads and parses the lockfile inside `install_dir`.
pub async fn read_lockfile(install_dir: &Path) -> Result<Credentials> {
    let path = install_dir.join(LOCKFILE_NAME);
    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        ClientError::ProcessNotFound(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(Credentials::parse_lockfile(&content)?)
}

// ============================================================================
// Awaiting a Client
// ============================================================================

/// Resolves credentials from the running client.
///
/// With `await_connection` unset this is a single attempt. With it set,
/// attempts repeat every `poll_interval` until one succeeds.
pub async fn authenticate(options: &AuthOptions) -> Result<Credentials> {
    acquire(&LockfileResolver::new(options), options).await
}

async fn acquire<S>(source: &S, options: &AuthOptions) -> Result<Credentials>
where
    S: CredentialSource + ?Sized,
{
    if !options.await_connection {
        return source.resolve().await;
    }

    await_credentials(source, options.poll_interval, &CancellationToken::new())
        .await
        .ok_or_else(|| ClientError::ProcessNotFound("resolution cancelled".to_string()))
}

/// Retries `source` every `poll_interval` until it yields credentials.
///
/// Returns `None` if `cancel_token` fires first; an attempt in flight at
/// that moment is dropped.
pub async fn await_credentials<S>(
    source: &S,
    poll_interval: Duration,
    cancel_token: &CancellationToken,
) -> Option<Credentials>
where
    S: CredentialSource + ?Sized,
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);

        let result = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return None,
            result = source.resolve() => result,
        };

        match result {
            Ok(credentials) => {
                info!(attempt, pid = credentials.pid(), "Client found");
                return Some(credentials);
            }
            Err(e) => {
                if attempt == 1 {
                    info!(error = %e, "Waiting for client to start");
                } else {
                    debug!(attempt, error = %e, "Client still unavailable");
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return None,
            _ = sleep(poll_interval) => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Platform;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Process query returning a fixed command line.
    struct FixedQuery {
        platform: Platform,
        output: String,
    }

    #[async_trait]
    impl ProcessQuery for FixedQuery {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn command_line(&self, _process_name: &str) -> Result<String> {
            Ok(self.output.clone())
        }
    }

    fn posix_resolver(output: String) -> LockfileResolver<FixedQuery> {
        LockfileResolver::with_query(
            FixedQuery {
                platform: Platform::Posix,
                output,
            },
            DEFAULT_PROCESS_NAME,
        )
    }

    fn install_dir_with_lockfile(content: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCKFILE_NAME), content).unwrap();
        dir
    }

    #[test]
    fn test_auth_options_default() {
        let options = AuthOptions::default();
        assert_eq!(options.process_name, "LeagueClientUx");
        assert!(!options.await_connection);
        assert_eq!(options.poll_interval, Duration::from_millis(2500));
        assert_eq!(options.windows_shell, WindowsShell::PowerShell);
    }

    #[tokio::test]
    async fn test_resolve_reads_lockfile() {
        let dir = install_dir_with_lockfile("LeagueClient:4242:50000:s3cret:https");
        let output = format!(
            "/opt/LeagueClientUx --install-directory={} --app-port=50000",
            dir.path().display()
        );

        let creds = posix_resolver(output).resolve().await.unwrap();
        assert_eq!(creds.pid(), 4242);
        assert_eq!(creds.port(), 50000);
        assert_eq!(creds.token(), "s3cret");
    }

    #[tokio::test]
    async fn test_resolve_windows_quoting() {
        let dir = install_dir_with_lockfile("LeagueClient:7:8:tok:https");
        let output = format!(
            "CommandLine\r\n\"LeagueClientUx.exe\" \"--install-directory={}\" \"--app-port=8\"\r\n",
            dir.path().display()
        );
        let resolver = LockfileResolver::with_query(
            FixedQuery {
                platform: Platform::Windows,
                output,
            },
            DEFAULT_PROCESS_NAME,
        );

        let creds = resolver.resolve().await.unwrap();
        assert_eq!(creds.pid(), 7);
    }

    #[tokio::test]
    async fn test_resolve_without_process() {
        let err = posix_resolver(String::new()).resolve().await.unwrap_err();
        assert!(matches!(err, ClientError::ProcessNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_missing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let output = format!("LeagueClientUx --install-directory={}", dir.path().display());

        let err = posix_resolver(output).resolve().await.unwrap_err();
        assert!(matches!(err, ClientError::ProcessNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_malformed_lockfile_same_kind() {
        for content in ["LeagueClient:1:2:tok", "LeagueClient:x:2:tok:https", "a:1:p:t:https"] {
            let dir = install_dir_with_lockfile(content);
            let output = format!("LeagueClientUx --install-directory={}", dir.path().display());

            let err = posix_resolver(output).resolve().await.unwrap_err();
            assert!(
                matches!(err, ClientError::ProcessNotFound(_)),
                "content {content:?} gave {err:?}"
            );
        }
    }

    /// Source that fails a fixed number of times before succeeding.
    struct FlakySource {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl CredentialSource for FlakySource {
        async fn resolve(&self) -> Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ClientError::ProcessNotFound("not yet".to_string()));
            }
            Ok(Credentials::parse_lockfile("LeagueClient:9:10:tok:https").unwrap())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_credentials_retries_until_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = FlakySource {
            failures_left: AtomicU32::new(3),
            calls: calls.clone(),
        };
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        let creds = await_credentials(&source, Duration::from_millis(100), &cancel)
            .await
            .unwrap();

        assert_eq!(creds.pid(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_credentials_cancelled() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = FlakySource {
            failures_left: AtomicU32::new(u32::MAX),
            calls,
        };
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = await_credentials(&source, Duration::from_millis(100), &cancel).await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_awaiting_uses_poll_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = FlakySource {
            failures_left: AtomicU32::new(2),
            calls: calls.clone(),
        };
        let options = AuthOptions {
            await_connection: true,
            poll_interval: Duration::from_millis(250),
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        let creds = acquire(&source, &options).await.unwrap();

        assert_eq!(creds.pid(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_acquire_single_attempt_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = FlakySource {
            failures_left: AtomicU32::new(1),
            calls: calls.clone(),
        };

        let err = acquire(&source, &AuthOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::ProcessNotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
