//! Connection lifecycle manager.
//!
//! [`LeagueClient`] holds the credentials of the client process it is
//! attached to and polls that process on a fixed interval. When the process
//! goes away it emits [`ClientEvent::Disconnect`]; it then waits for a new
//! client to come up, re-resolves credentials and emits
//! [`ClientEvent::Connect`] with them.
//!
//! # State Machine
//!
//! ```text
//!          pid dead / Disconnect
//!   ┌───────────┐ ───────────▶ ┌──────────────┐
//!   │ Connected │              │ Disconnected │
//!   └───────────┘ ◀─────────── └──────────────┘
//!          re-resolved / Connect(credentials)
//! ```
//!
//! All ticks run on one task, so a tick never overlaps the previous one.
//! Re-acquisition occupies its tick until a client is found, which keeps a
//! liveness check from racing the credential swap.
//!
//! # Stopping
//!
//! `stop()` cancels the poll task under the state lock, and transitions
//! check the cancellation token under the same lock before committing. No
//! event is delivered once `stop()` has returned, even if a re-acquisition
//! was in flight; that attempt is dropped at its next await point.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned state lock is recovered, not propagated
//! - Event sends with no subscribers are ignored

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lcu_core::Credentials;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{await_credentials, AuthOptions, CredentialSource, LockfileResolver};
use crate::error::{ClientError, Result};
use crate::liveness::{Liveness, ProcessLiveness};

// ============================================================================
// Configuration
// ============================================================================

/// Default time between liveness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Capacity of the event channel. Lifecycle events are rare; a subscriber
/// has to fall this far behind before it sees `Lagged`.
const EVENT_BUFFER: usize = 16;

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time between checks for a client disconnect. Also used as the retry
    /// delay while waiting for a client to come back.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ============================================================================
// State and Events
// ============================================================================

/// Where the manager currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// No valid credentials are held
    Disconnected,
    /// Credentials are believed to belong to a live process
    Connected(Credentials),
}

impl LifecycleState {
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Connected(credentials) => Some(credentials),
            Self::Disconnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Lifecycle events delivered to subscribers, in tick order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A client came (back) up with these credentials
    Connect(Credentials),
    /// The client process went away
    Disconnect,
}

/// State shared between the manager and its poll task.
struct Shared {
    state: Mutex<LifecycleState>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commits `next` and emits `event` unless polling has been stopped.
    fn transition(
        &self,
        cancel_token: &CancellationToken,
        next: LifecycleState,
        event: ClientEvent,
    ) -> bool {
        let mut state = self.lock_state();
        if cancel_token.is_cancelled() {
            debug!("Dropping transition after stop");
            return false;
        }
        *state = next;
        // No subscribers is not an error
        let _ = self.events.send(event);
        true
    }
}

/// Handle to a running poll task.
struct Poller {
    cancel_token: CancellationToken,
    _task: JoinHandle<()>,
}

// ============================================================================
// League Client
// ============================================================================

/// Polling state machine tracking a League Client process.
///
/// # Example
///
/// ```rust,no_run
/// use lcu_client::{authenticate, AuthOptions, ClientConfig, ClientEvent, LeagueClient};
///
/// # async fn example() -> lcu_client::Result<()> {
/// let credentials = authenticate(&AuthOptions::default()).await?;
/// let mut client = LeagueClient::new(credentials, ClientConfig::default());
/// let mut events = client.subscribe();
/// client.start()?;
///
/// while let Ok(event) = events.recv().await {
///     match event {
///         ClientEvent::Connect(credentials) => println!("up on port {}", credentials.port()),
///         ClientEvent::Disconnect => println!("client closed"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct LeagueClient<S = LockfileResolver, L = ProcessLiveness> {
    config: ClientConfig,
    source: Arc<S>,
    liveness: Arc<L>,
    shared: Arc<Shared>,
    poller: Option<Poller>,
}

impl LeagueClient {
    /// Creates a manager for `credentials` backed by the real process table
    /// and lockfile. Re-acquisition looks for the default process name; use
    /// [`LeagueClient::with_options`] to change it.
    #[must_use]
    pub fn new(credentials: Credentials, config: ClientConfig) -> Self {
        Self::with_options(credentials, config, &AuthOptions::default())
    }

    /// Like [`LeagueClient::new`], re-acquiring with the process name and
    /// Windows shell from `options`.
    #[must_use]
    pub fn with_options(credentials: Credentials, config: ClientConfig, options: &AuthOptions) -> Self {
        Self::with_parts(
            credentials,
            config,
            LockfileResolver::new(options),
            ProcessLiveness,
        )
    }
}

impl<S, L> LeagueClient<S, L>
where
    S: CredentialSource + 'static,
    L: Liveness + 'static,
{
    /// Creates a manager with custom credential source and liveness probe.
    #[must_use]
    pub fn with_parts(credentials: Credentials, config: ClientConfig, source: S, liveness: L) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            source: Arc::new(source),
            liveness: Arc::new(liveness),
            shared: Arc::new(Shared {
                state: Mutex::new(LifecycleState::Connected(credentials)),
                events,
            }),
            poller: None,
        }
    }

    /// Validates the held credentials and starts polling.
    ///
    /// Must be called from within a Tokio runtime. Calling it while already
    /// running is a no-op.
    ///
    /// # Errors
    ///
    /// `ClientError::ClientNotFound` if no credentials are held or their
    /// process is not alive. No poll task is created in that case.
    pub fn start(&mut self) -> Result<()> {
        if self.poller.is_some() {
            debug!("Lifecycle manager already running");
            return Ok(());
        }

        let pid = self
            .shared
            .lock_state()
            .credentials()
            .map(Credentials::pid)
            .ok_or(ClientError::ClientNotFound)?;

        if !self.liveness.is_alive(pid) {
            warn!(pid, "Client process is not running");
            return Err(ClientError::ClientNotFound);
        }

        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(run_poller(
            self.shared.clone(),
            self.source.clone(),
            self.liveness.clone(),
            self.config.poll_interval,
            cancel_token.clone(),
        ));

        info!(
            pid,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Lifecycle manager started"
        );

        self.poller = Some(Poller {
            cancel_token,
            _task: task,
        });
        Ok(())
    }
}

impl<S, L> LeagueClient<S, L> {
    /// Subscribes to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Returns a copy of the current state.
    pub fn state(&self) -> LifecycleState {
        self.shared.lock_state().clone()
    }

    /// Returns a copy of the current credentials, if connected.
    pub fn credentials(&self) -> Option<Credentials> {
        self.shared.lock_state().credentials().cloned()
    }

    /// Returns true between a successful `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        self.poller.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Stops polling. Idempotent and safe to call before `start()`.
    pub fn stop(&mut self) {
        let Some(poller) = self.poller.take() else {
            return;
        };

        {
            let _state = self.shared.lock_state();
            poller.cancel_token.cancel();
        }

        info!("Lifecycle manager stopped");
    }
}

impl<S, L> Drop for LeagueClient<S, L> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Poll Task
// ============================================================================

async fn run_poller<S, L>(
    shared: Arc<Shared>,
    source: Arc<S>,
    liveness: Arc<L>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) where
    S: CredentialSource + ?Sized,
    L: Liveness + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let held = shared.lock_state().credentials().cloned();
        match held {
            Some(credentials) => {
                if liveness.is_alive(credentials.pid()) {
                    continue;
                }
                info!(pid = credentials.pid(), "Client process exited");
                shared.transition(
                    &cancel_token,
                    LifecycleState::Disconnected,
                    ClientEvent::Disconnect,
                );
            }
            None => {
                let Some(credentials) =
                    await_credentials(source.as_ref(), poll_interval, &cancel_token).await
                else {
                    break;
                };
                info!(
                    pid = credentials.pid(),
                    port = credentials.port(),
                    "Client reconnected"
                );
                shared.transition(
                    &cancel_token,
                    LifecycleState::Connected(credentials.clone()),
                    ClientEvent::Connect(credentials),
                );
            }
        }
    }

    debug!("Lifecycle poll task completed");
}

// ============================================================================
// Tests
// ============================================================================
