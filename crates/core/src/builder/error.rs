//! Builder error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::BundleError;
use crate::process::ProcessError;

/// Errors that end a build attempt.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("bundle store: {0}")]
    Store(#[from] BundleError),

    #[error("{0}")]
    Tool(ProcessError),

    #[error("cannot stage {file}: {reason}")]
    Staging { file: String, reason: String },

    #[error("working directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deploy to {} failed: {reason}", path.display())]
    Deploy { path: PathBuf, reason: String },

    #[error("invalid build recipe: {0}")]
    Recipe(String),

    #[error("build cancelled")]
    Cancelled,
}

impl From<ProcessError> for BuildError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Cancelled => Self::Cancelled,
            other => Self::Tool(other),
        }
    }
}

impl BuildError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
