//! Error types for external process management.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started (missing, not executable, ...).
    #[error("failed to launch {}: {reason}", program.display())]
    LaunchFailed { program: PathBuf, reason: String },

    /// The tool ran and exited with a non-zero code.
    ///
    /// Processes terminated by a signal report exit code -1.
    #[error("build tool exited with code {exit_code}")]
    BuildToolFailed {
        exit_code: i32,
        stderr: Option<String>,
    },

    /// The tool did not finish within its time limit and was killed.
    #[error("build tool timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// The wait was cancelled and the tool was terminated.
    #[error("build tool cancelled")]
    Cancelled,

    /// The argument string could not be split.
    #[error("invalid argument string: {0}")]
    InvalidArguments(String),

    /// I/O error while supervising the tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Exit code for failures where the tool actually ran.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::BuildToolFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessError::BuildToolFailed {
            exit_code: 1,
            stderr: Some("bad input".to_string()),
        };
        assert_eq!(err.to_string(), "build tool exited with code 1");
        assert_eq!(err.exit_code(), Some(1));

        let err = ProcessError::LaunchFailed {
            program: PathBuf::from("/opt/tools/compiler"),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to launch /opt/tools/compiler: No such file or directory"
        );
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(ProcessError::Cancelled.is_cancelled());
        assert!(!ProcessError::Timeout { secs: 5 }.is_cancelled());
    }
}
