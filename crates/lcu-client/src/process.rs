//! Process table queries and install-directory extraction.
//!
//! Locating the client means finding its command line and pulling the
//! `--install-directory=` argument out of it. How the command line is
//! obtained and how the argument is delimited both depend on the platform:
//!
//! - Windows reports each argument quoted: `"--install-directory=C:/Riot Games/League of Legends"`
//! - POSIX `ps` output separates arguments with spaces: `--install-directory=/Applications/... --app-port=...`
//!
//! The OS call lives behind [`ProcessQuery`]; extraction is a pair of pure
//! functions so both patterns can be tested anywhere.

use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClientError, Result};

// ============================================================================
// Patterns
// ============================================================================

static WINDOWS_INSTALL_DIRECTORY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""--install-directory=(.*?)""#).ok());

static POSIX_INSTALL_DIRECTORY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"--install-directory=(.*?)( --|\n|$)").ok());

// ============================================================================
// Platform
// ============================================================================

/// Which command line conventions to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// Which Windows tool to query the process table with.
///
/// WMIC is deprecated and missing from recent Windows builds; PowerShell's
/// `Get-CimInstance` returns the same `CommandLine` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowsShell {
    #[default]
    PowerShell,
    Wmic,
}

// ============================================================================
// Extraction
// ============================================================================

/// Extracts the install directory from Windows `CommandLine` output.
pub fn extract_install_directory_windows(command_line: &str) -> Option<PathBuf> {
    capture_first(WINDOWS_INSTALL_DIRECTORY.as_ref()?, command_line)
}

/// Extracts the install directory from POSIX `ps` output.
pub fn extract_install_directory_posix(command_line: &str) -> Option<PathBuf> {
    capture_first(POSIX_INSTALL_DIRECTORY.as_ref()?, command_line)
}

/// Extracts the install directory using the pattern for `platform`.
pub fn extract_install_directory(platform: Platform, command_line: &str) -> Option<PathBuf> {
    match platform {
        Platform::Windows => extract_install_directory_windows(command_line),
        Platform::Posix => extract_install_directory_posix(command_line),
    }
}

fn capture_first(pattern: &Regex, text: &str) -> Option<PathBuf> {
    let value = pattern.captures(text)?.get(1)?.as_str();
    if value.is_empty() {
        return None;
    }
    Some(PathBuf::from(value))
}

/// Keeps the lines of a process listing that mention `process_name`.
fn matching_lines(listing: &str, process_name: &str) -> String {
    listing
        .lines()
        .filter(|line| line.contains(process_name))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Process Query
// ============================================================================

/// Capability to fetch the command line of a named process.
///
/// Implementations return the raw text the platform tool printed; an empty
/// or unrelated result simply fails extraction later.
#[async_trait]
pub trait ProcessQuery: Send + Sync {
    /// Platform whose argument quoting the returned text follows.
    fn platform(&self) -> Platform;

    /// Returns the command line(s) of processes named `process_name`.
    async fn command_line(&self, process_name: &str) -> Result<String>;
}

/// Queries the real process table with the platform's own tools.
#[derive(Debug, Clone)]
pub struct SystemProcessQuery {
    platform: Platform,
    windows_shell: WindowsShell,
}

impl SystemProcessQuery {
    /// Creates a query for the current platform.
    #[must_use]
    pub fn new(windows_shell: WindowsShell) -> Self {
        Self {
            platform: Platform::current(),
            windows_shell,
        }
    }

    fn build_command(&self, process_name: &str) -> Command {
        match (self.platform, self.windows_shell) {
            (Platform::Windows, WindowsShell::PowerShell) => {
                let query = format!(
                    "Get-CimInstance -Query \"SELECT * from Win32_Process WHERE name LIKE '{process_name}.exe'\" | Select-Object -ExpandProperty CommandLine"
                );
                let mut cmd = Command::new("powershell");
                cmd.arg("-NoProfile").arg("-Command").arg(query);
                cmd
            }
            (Platform::Windows, WindowsShell::Wmic) => {
                let filter = format!("name='{process_name}.exe'");
                let mut cmd = Command::new("WMIC");
                cmd.arg("PROCESS")
                    .arg("WHERE")
                    .arg(filter)
                    .arg("GET")
                    .arg("CommandLine");
                cmd
            }
            (Platform::Posix, _) => {
                let mut cmd = Command::new("ps");
                cmd.args(["x", "-o", "args"]);
                cmd
            }
        }
    }
}

impl Default for SystemProcessQuery {
    fn default() -> Self {
        Self::new(WindowsShell::default())
    }
}

#[async_trait]
impl ProcessQuery for SystemProcessQuery {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn command_line(&self, process_name: &str) -> Result<String> {
        let output = self
            .build_command(process_name)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ClientError::ProcessNotFound(format!("process query failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = match self.platform {
            Platform::Windows => stdout.into_owned(),
            Platform::Posix => matching_lines(&stdout, process_name),
        };

        debug!(
            process_name,
            status = ?output.status.code(),
            bytes = text.len(),
            "Queried process table"
        );

        Ok(text)
    }
}

// ============================================================================
// Process Snapshot
// ============================================================================

/// Point-in-time view of a running process, for status reporting.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Seconds since the process started
    pub run_time_secs: u64,
}

impl ProcessSnapshot {
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / 1024 / 1024
    }
}

/// Reads name, memory and uptime of `pid` from the process table.
///
/// Returns `None` if the process does not exist or cannot be inspected.
/// Performs a blocking process table read; call from `spawn_blocking`
/// in async contexts.
pub fn inspect(pid: u32) -> Option<ProcessSnapshot> {
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new().with_memory(),
    );

    system.process(target).map(|process| ProcessSnapshot {
        pid,
        name: std::ffi::OsStr::new(process.name())
            .to_string_lossy()
            .into_owned(),
        memory_bytes: process.memory(),
        run_time_secs: process.run_time(),
    })
}

// ============================================================================
// Tests
// ============================================================================
