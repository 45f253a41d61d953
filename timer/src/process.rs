//! Single-child process control.
//!
//! [`ProcessController`] owns at most one [`ManagedProcess`]. Starting a new
//! process replaces the tracked reference without killing the old one; callers
//! stop explicitly. Liveness is reconciled against the OS on every query so a
//! process that exits on its own is observed as stopped at the next check.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::error::TimerError;
use crate::target::Target;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How a call to [`ProcessControl::stop`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was tracked, or the tracked process had already exited.
    NotRunning,
    /// The process exited within the grace period.
    Exited,
    /// The grace period elapsed and the process was force-killed.
    Killed,
}

/// The seam between timer policies and the OS. Policies only ever talk to
/// this trait so they can be driven by a fake in tests.
#[async_trait]
pub trait ProcessControl: Send {
    /// Launches `target`, returning the new pid.
    fn start(&mut self, target: &Target) -> Result<u32, TimerError>;

    /// Stops the tracked process: graceful request first, then a forceful
    /// kill once the grace period elapses. Never fails.
    async fn stop(&mut self) -> StopOutcome;

    /// Whether the tracked process is still alive.
    fn is_running(&mut self) -> bool;

    /// Pid of the tracked process, if any.
    fn pid(&self) -> Option<u32>;

    /// Local wall-clock time the tracked process was launched.
    fn started_at(&self) -> Option<NaiveDateTime>;

    /// Exit code of the most recently reaped process, if it reported one.
    fn last_exit_code(&self) -> Option<i32>;
}

/// A launched child process.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    pid: u32,
    started_at: NaiveDateTime,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }
}

#[derive(Debug)]
pub struct ProcessController {
    current: Option<ManagedProcess>,
    grace_period: Duration,
    last_exit_code: Option<i32>,
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProcessController {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            current: None,
            grace_period,
            last_exit_code: None,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Applies a reloaded grace period. Takes effect at the next stop.
    pub fn set_grace_period(&mut self, grace_period: Duration) {
        self.grace_period = grace_period;
    }
}

#[async_trait]
impl ProcessControl for ProcessController {
    fn start(&mut self, target: &Target) -> Result<u32, TimerError> {
        target.revalidate()?;

        let child = Command::new(target.path())
            .args(target.args())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| TimerError::LaunchError {
                path: target.path().to_path_buf(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| TimerError::LaunchError {
            path: target.path().to_path_buf(),
            source: std::io::Error::other("spawned process has no pid"),
        })?;

        if let Some(previous) = &self.current {
            tracing::debug!(pid = previous.pid, "replacing tracked process reference");
        }
        tracing::info!(pid, target = %target, "process started");

        self.current = Some(ManagedProcess {
            child,
            pid,
            started_at: chrono::Local::now().naive_local(),
        });
        Ok(pid)
    }

    async fn stop(&mut self) -> StopOutcome {
        if !self.is_running() {
            return StopOutcome::NotRunning;
        }
        let Some(mut process) = self.current.take() else {
            return StopOutcome::NotRunning;
        };

        let pid = process.pid;
        request_graceful_exit(&mut process.child, pid);

        match tokio::time::timeout(self.grace_period, process.child.wait()).await {
            Ok(Ok(status)) => {
                self.last_exit_code = status.code();
                tracing::info!(pid, %status, "process stopped");
                StopOutcome::Exited
            }
            Ok(Err(e)) => {
                // The child can no longer be waited on; treat it as gone.
                tracing::warn!(pid, error = %e, "failed to wait on stopping process");
                StopOutcome::Exited
            }
            Err(_) => {
                let timeout = TimerError::TerminationTimeout {
                    pid,
                    grace: self.grace_period,
                };
                tracing::warn!("{timeout}; escalating to forceful kill");
                if let Err(e) = process.child.kill().await {
                    tracing::warn!(pid, error = %e, "forceful kill failed");
                }
                self.last_exit_code = None;
                StopOutcome::Killed
            }
        }
    }

    fn is_running(&mut self) -> bool {
        let Some(process) = self.current.as_mut() else {
            return false;
        };
        match process.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::info!(pid = process.pid, %status, "process exited on its own");
                self.last_exit_code = status.code();
                self.current = None;
                false
            }
            Err(e) => {
                tracing::warn!(pid = process.pid, error = %e, "failed to query process status");
                self.current = None;
                false
            }
        }
    }

    fn pid(&self) -> Option<u32> {
        self.current.as_ref().map(ManagedProcess::pid)
    }

    fn started_at(&self) -> Option<NaiveDateTime> {
        self.current.as_ref().map(ManagedProcess::started_at)
    }

    fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }
}

/// Sends SIGTERM on Unix. Windows has no portable graceful-exit request for
/// arbitrary processes, so the child is killed outright there.
#[cfg(unix)]
fn request_graceful_exit(_child: &mut Child, pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "pid out of range for SIGTERM");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::warn!(pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(child: &mut Child, pid: u32) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(pid, error = %e, "failed to terminate process");
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str) -> Target {
        Target::new("/bin/sh").unwrap().with_args(["-c", script])
    }

    async fn wait_until_stopped(controller: &mut ProcessController) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !controller.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn stop_without_process_is_a_no_op() {
        let mut controller = ProcessController::default();
        assert_eq!(controller.stop().await, StopOutcome::NotRunning);
        assert!(!controller.is_running());
        assert!(controller.pid().is_none());
    }

    #[tokio::test]
    async fn start_rejects_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let target = Target::new(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut controller = ProcessController::default();
        let err = controller.start(&target).unwrap_err();
        assert!(matches!(err, TimerError::InvalidTargetPath { .. }));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn start_tracks_pid_and_start_time() {
        let mut controller = ProcessController::default();
        let pid = controller.start(&shell("exec sleep 30")).unwrap();
        assert_eq!(controller.pid(), Some(pid));
        assert!(controller.started_at().is_some());
        assert!(controller.is_running());
        assert_eq!(controller.stop().await, StopOutcome::Exited);
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn natural_exit_is_observed_without_stop() {
        let mut controller = ProcessController::default();
        controller.start(&shell("exit 3")).unwrap();
        assert!(wait_until_stopped(&mut controller).await);
        assert!(controller.pid().is_none());
        assert_eq!(controller.last_exit_code(), Some(3));
        assert_eq!(controller.stop().await, StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn stop_escalates_when_sigterm_is_ignored() {
        let mut controller = ProcessController::new(Duration::from_millis(300));
        controller
            .start(&shell("trap '' TERM; while :; do sleep 1; done"))
            .unwrap();
        // Give the shell time to install the trap before signalling it.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        assert_eq!(controller.stop().await, StopOutcome::Killed);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn set_grace_period_applies_to_next_stop() {
        let mut controller = ProcessController::default();
        controller.set_grace_period(Duration::from_millis(500));
        assert_eq!(controller.grace_period(), Duration::from_millis(500));
    }
}
