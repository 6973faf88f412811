//! Types for per-provider build task state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Provider;

/// Build status of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Ready,
    InProgress,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "Ready",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Error => "Error",
        }
    }
}

/// Point-in-time copy of a provider's task state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub provider: Provider,
    pub status: TaskStatus,
    /// 0-100.
    pub progress: u8,
    /// Label of the bundle being built; empty when idle.
    pub current_build: String,
    /// Reason of the last failure, kept until the next start.
    pub last_error: Option<String>,
    /// Number of build attempts started since process start.
    pub attempt: u64,
}

impl TaskSnapshot {
    pub fn idle(provider: Provider) -> Self {
        Self {
            provider,
            status: TaskStatus::Ready,
            progress: 0,
            current_build: String::new(),
            last_error: None,
            attempt: 0,
        }
    }
}

/// Errors returned by task state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("{provider} build already in progress ({current_build})")]
    AlreadyInProgress {
        provider: Provider,
        current_build: String,
    },
}
