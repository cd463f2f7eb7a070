//! lcu - League Client connection tool
//!
//! Locates a running League Client, reports on it, and follows its
//! lifecycle and event stream.
//!
//! # Usage
//!
//! ```bash
//! # Print the credentials of the running client
//! lcu credentials
//! lcu credentials --json --show-token
//!
//! # Check whether the client is up
//! lcu status
//!
//! # Follow client restarts, and print API events while connected
//! lcu watch --events
//!
//! # Custom process name and poll interval
//! LCU_PROCESS_NAME=LeagueClientUx LCU_POLL_INTERVAL_MS=1000 lcu watch
//!
//! # Enable debug logging
//! RUST_LOG=lcu_client=debug lcu watch
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop watching and exit

use std::env;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lcu_client::{
    authenticate, connect, inspect, is_alive, AuthOptions, ClientConfig, ClientEvent,
    CredentialSource, LeagueClient, LockfileResolver, WindowsShell, DEFAULT_POLL_INTERVAL,
};
use lcu_core::Credentials;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const REDACTED: &str = "<redacted>";

/// League Client connection tool
#[derive(Parser, Debug)]
#[command(name = "lcu", version, about)]
struct Args {
    /// Query the process table with WMIC instead of PowerShell (Windows)
    #[arg(long, global = true)]
    wmic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and print the running client's credentials
    Credentials {
        /// Print as JSON
        #[arg(long)]
        json: bool,
        /// Include the auth token in the output
        #[arg(long)]
        show_token: bool,
    },
    /// Report whether the client is running
    Status,
    /// Wait for the client and report connects and disconnects
    Watch {
        /// Open the event stream after each connect and print API events
        #[arg(long)]
        events: bool,
    },
}

/// Builds resolution options from flags and environment overrides.
fn auth_options(args: &Args) -> AuthOptions {
    let mut options = AuthOptions {
        poll_interval: poll_interval(),
        ..Default::default()
    };
    if let Ok(name) = env::var("LCU_PROCESS_NAME") {
        if !name.is_empty() {
            options.process_name = name;
        }
    }
    if args.wmic {
        options.windows_shell = WindowsShell::Wmic;
    }
    options
}

fn poll_interval() -> Duration {
    env::var("LCU_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lcu=info".parse()?)
                .add_directive("lcu_client=info".parse()?)
                .add_directive("lcu_core=info".parse()?)
                .add_directive("lcu_protocol=info".parse()?),
        )
        .init();

    let options = auth_options(&args);
    debug!(
        process_name = %options.process_name,
        poll_interval_ms = options.poll_interval.as_millis() as u64,
        "Resolved options"
    );

    match args.command {
        Command::Credentials { json, show_token } => print_credentials(&options, json, show_token).await,
        Command::Status => status(&options).await,
        Command::Watch { events } => {
            let cancel_token = CancellationToken::new();

            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                if let Err(e) = wait_for_shutdown_signal().await {
                    error!(error = %e, "Error waiting for shutdown signal");
                }
                shutdown_token.cancel();
            });

            watch(&options, events, cancel_token).await
        }
    }
}

// ============================================================================
// credentials / status
// ============================================================================

async fn print_credentials(options: &AuthOptions, json: bool, show_token: bool) -> Result<()> {
    let credentials = authenticate(options)
        .await
        .context("Failed to resolve client credentials")?;
    let token = if show_token { credentials.token() } else { REDACTED };

    if json {
        let value = serde_json::json!({
            "process_name": credentials.process_name(),
            "pid": credentials.pid(),
            "port": credentials.port(),
            "token": token,
            "protocol": credentials.protocol(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Process:  {}", credentials.process_name());
        println!("PID:      {}", credentials.pid());
        println!("Port:     {}", credentials.port());
        println!("Protocol: {}", credentials.protocol());
        println!("Token:    {token}");
    }
    Ok(())
}

async fn status(options: &AuthOptions) -> Result<()> {
    let resolver = LockfileResolver::new(options);
    let credentials = match resolver.resolve().await {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("Client is not running ({e}).");
            process::exit(1);
        }
    };

    let pid = credentials.pid();
    if !is_alive(pid) {
        println!("Client is not running (stale lockfile for PID {pid}).");
        process::exit(1);
    }

    println!("Client is running (PID {pid})");
    println!("API: {}://127.0.0.1:{}", credentials.protocol(), credentials.port());

    let snapshot = tokio::task::spawn_blocking(move || inspect(pid))
        .await
        .context("Process inspection task failed")?;
    if let Some(snapshot) = snapshot {
        println!("Name: {}", snapshot.name);
        println!("Memory: {} MB", snapshot.memory_mb());
        println!("Uptime: {}s", snapshot.run_time_secs);
    }
    Ok(())
}

// ============================================================================
// watch
// ============================================================================

/// An event printer bound to one set of credentials.
struct EventPrinter {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventPrinter {
    fn spawn(credentials: Credentials, parent: &CancellationToken) -> Self {
        let cancel_token = parent.child_token();
        let handle = tokio::spawn(print_events(credentials, cancel_token.clone()));
        Self {
            cancel_token,
            handle,
        }
    }

    /// Stops the printer and waits for it. Returns false if the task
    /// panicked or was aborted.
    async fn shutdown(self) -> bool {
        self.cancel_token.cancel();
        match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Event printer task failed");
                false
            }
        }
    }
}

async fn print_events(credentials: Credentials, cancel_token: CancellationToken) {
    let mut stream = match connect(Some(credentials)).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Event stream unavailable");
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            next = stream.next_event() => next,
        };

        match next {
            Some(Ok(event)) => println!("{:?} {} {}", event.event_type, event.uri, event.data),
            Some(Err(e)) => warn!(error = %e, "Skipping event"),
            None => {
                info!("Event stream ended");
                return;
            }
        }
    }

    if let Err(e) = stream.close().await {
        debug!(error = %e, "Event stream close failed");
    }
}

async fn watch(options: &AuthOptions, events: bool, cancel_token: CancellationToken) -> Result<()> {
    let waiting = AuthOptions {
        await_connection: true,
        ..options.clone()
    };

    info!(process_name = %options.process_name, "Waiting for client");
    let credentials = tokio::select! {
        _ = cancel_token.cancelled() => return Ok(()),
        result = authenticate(&waiting) => result.context("Failed to resolve client credentials")?,
    };
    println!("connected: PID {} port {}", credentials.pid(), credentials.port());

    let config = ClientConfig {
        poll_interval: options.poll_interval,
    };
    let mut client = LeagueClient::with_options(credentials.clone(), config, options);
    let mut lifecycle = client.subscribe();
    client
        .start()
        .context("Client exited before monitoring started")?;

    let mut printer = events.then(|| EventPrinter::spawn(credentials, &cancel_token));

    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = lifecycle.recv() => event,
        };

        match event {
            Ok(ClientEvent::Connect(credentials)) => {
                println!("connected: PID {} port {}", credentials.pid(), credentials.port());
                if events {
                    if let Some(old) = printer.take() {
                        old.shutdown().await;
                    }
                    printer = Some(EventPrinter::spawn(credentials, &cancel_token));
                }
            }
            Ok(ClientEvent::Disconnect) => {
                println!("disconnected");
                if let Some(old) = printer.take() {
                    old.shutdown().await;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed lifecycle events"),
            Err(RecvError::Closed) => break,
        }
    }

    client.stop();
    if let Some(printer) = printer {
        printer.shutdown().await;
    }
    info!("Stopped watching");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
