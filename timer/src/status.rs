use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::policy::PolicyState;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshot of a session, as shown at the console and mirrored into
/// `status.toml` for external displays.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimerStatus {
    /// Binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Policy state.
    pub state: PolicyState,
    /// Whether the managed process is alive right now.
    pub running: bool,
    /// Launches performed by the current (or last) activation.
    pub launches: u32,
    /// Selected target, including pass-through arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Human-readable description of the active policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Local time the running process was launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_started: Option<String>,
    /// Local time of the most recent launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_launch: Option<String>,
    /// Local time a scheduled policy will next launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_launch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    /// Message from the last failed operation, cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TimerStatus {
    /// Constructs the initial idle status on startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: PolicyState::Idle,
            running: false,
            launches: 0,
            target: None,
            policy: None,
            pid: None,
            process_started: None,
            last_launch: None,
            next_launch: None,
            last_exit_code: None,
            error: None,
        }
    }
}

impl Default for TimerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Script:  {}",
            self.target.as_deref().unwrap_or("(none selected)")
        )?;
        write!(f, "Timer:   {}", self.state)?;
        if let Some(policy) = &self.policy {
            write!(f, " ({policy})")?;
        }
        writeln!(f)?;
        match (self.pid, &self.process_started) {
            (Some(pid), Some(since)) if self.running => {
                writeln!(f, "Process: running (pid {pid}, since {since})")?
            }
            (Some(pid), None) if self.running => writeln!(f, "Process: running (pid {pid})")?,
            _ => writeln!(f, "Process: not running")?,
        }
        write!(f, "Launches: {}", self.launches)?;
        if let Some(last) = &self.last_launch {
            write!(f, ", last at {last}")?;
        }
        if let Some(code) = self.last_exit_code {
            write!(f, ", last exit code {code}")?;
        }
        if let Some(next) = &self.next_launch {
            write!(f, "\nNext launch: {next}")?;
        }
        if let Some(error) = &self.error {
            write!(f, "\nLast error: {error}")?;
        }
        Ok(())
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A failed write is logged and otherwise ignored; it must never stop the timer.
pub fn write_status(path: &Path, status: &TimerStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(
                dir = %parent.display(),
                error = %e,
                "failed to create status directory"
            );
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to write status file"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize status"),
    }
}
