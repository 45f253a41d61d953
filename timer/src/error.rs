//! Errors surfaced by the process controller and timer policies.
//!
//! Every variant except [`TimerError::TerminationTimeout`] is returned to the
//! presentation layer and shown to the user. `TerminationTimeout` is only ever
//! logged: the controller recovers from it by force-killing the process.
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The selected target does not exist, is not a file, or is not executable.
    #[error("invalid target '{}': {reason}", .path.display())]
    InvalidTargetPath { path: PathBuf, reason: String },

    /// The OS refused to spawn the target.
    #[error("failed to launch '{}': {source}", .path.display())]
    LaunchError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process ignored the graceful stop request and was killed.
    #[error("process {pid} did not exit within {}s of a stop request", .grace.as_secs_f32())]
    TerminationTimeout { pid: u32, grace: Duration },

    /// A policy parameter is out of range or malformed.
    #[error("invalid policy parameter: {0}")]
    InvalidPolicyParameter(String),

    /// A start was requested before any target was selected.
    #[error("no script selected")]
    NoTargetSelected,
}

impl TimerError {
    pub fn invalid_target(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidTargetPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_target_message_names_path_and_reason() {
        let err = TimerError::invalid_target("/tmp/missing.sh", "file not found");
        assert_eq!(
            err.to_string(),
            "invalid target '/tmp/missing.sh': file not found"
        );
    }

    #[test]
    fn launch_error_exposes_io_source() {
        let err = TimerError::LaunchError {
            path: PathBuf::from("/bin/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn termination_timeout_reports_grace_seconds() {
        let err = TimerError::TerminationTimeout {
            pid: 42,
            grace: Duration::from_secs(2),
        };
        assert_eq!(
            err.to_string(),
            "process 42 did not exit within 2s of a stop request"
        );
    }
}
