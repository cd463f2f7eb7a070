//! Process liveness probing.
//!
//! On Unix a pid is probed with `kill(pid, 0)`: no signal is delivered but
//! the kernel still performs its existence and permission checks. The
//! three possible outcomes map to a yes/no answer:
//!
//! | Probe result            | Alive? |
//! |-------------------------|--------|
//! | success                 | yes    |
//! | `EPERM`                 | yes (exists, owned by another user) |
//! | anything else (`ESRCH`) | no     |
//!
//! Elsewhere the process table is queried through `sysinfo`.

use std::sync::Arc;

use tracing::trace;

// ============================================================================
// Probe Outcome
// ============================================================================

/// Result of sending the null signal to a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The signal could be delivered
    Exists,
    /// The process exists but belongs to another principal
    PermissionDenied,
    /// No such process, or any other failure
    Absent,
}

impl ProbeOutcome {
    /// Classifies the `errno` of a failed probe.
    pub fn from_errno(errno: Option<i32>) -> Self {
        match errno {
            Some(code) if code == libc::EPERM => Self::PermissionDenied,
            _ => Self::Absent,
        }
    }

    /// Permission denied counts as evidence of existence.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Exists | Self::PermissionDenied)
    }
}

// ============================================================================
// Liveness Trait
// ============================================================================

/// Answers whether a previously observed pid still refers to a running
/// process. Implementations must not block and must not fail.
pub trait Liveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

impl<T: Liveness + ?Sized> Liveness for Arc<T> {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }
}

/// Liveness backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLiveness;

impl Liveness for ProcessLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }
}

/// Probes `pid` and reports whether it is alive.
///
/// Pid 0 and values beyond `i32::MAX` are never alive: `kill` would
/// interpret them as process groups.
pub fn is_alive(pid: u32) -> bool {
    let outcome = probe(pid);
    trace!(pid, ?outcome, "Probed process");
    outcome.is_alive()
}

#[cfg(unix)]
fn probe(pid: u32) -> ProbeOutcome {
    let Ok(raw) = i32::try_from(pid) else {
        return ProbeOutcome::Absent;
    };
    if raw <= 0 {
        return ProbeOutcome::Absent;
    }

    // SAFETY: signal 0 performs permission and existence checks only.
    let result = unsafe { libc::kill(raw, 0) };
    if result == 0 {
        ProbeOutcome::Exists
    } else {
        ProbeOutcome::from_errno(std::io::Error::last_os_error().raw_os_error())
    }
}

#[cfg(not(unix))]
fn probe(pid: u32) -> ProbeOutcome {
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    if pid == 0 {
        return ProbeOutcome::Absent;
    }

    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new(),
    );

    if system.process(target).is_some() {
        ProbeOutcome::Exists
    } else {
        ProbeOutcome::Absent
    }
}
