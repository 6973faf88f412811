//! Lifecycle configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Single-instance lock file, holding the owner's pid.
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    /// How long shutdown waits for cancelled builds before killing tools.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("dirforge.lock")
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl LifecycleConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
