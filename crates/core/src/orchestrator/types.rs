//! Types for the build orchestrator.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::builder::StartOutcome;
use crate::provider::Provider;

/// Errors during process start-up.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another instance holds the lock.
    #[error("another instance is running (pid {pid}, lock {})", path.display())]
    AlreadyRunning { pid: u32, path: PathBuf },

    /// The lock file could not be created or inspected.
    #[error("lock file {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a command could not be carried out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("provider {0} is disabled")]
    ProviderDisabled(Provider),

    #[error("service is shutting down")]
    ShuttingDown,
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Start(StartOutcome),
    /// True if a running build was cancelled.
    Cancel(bool),
    Status,
}
