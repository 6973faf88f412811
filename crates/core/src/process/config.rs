//! Process runner configuration.

use serde::{Deserialize, Serialize};

/// Configuration for supervising external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// How long a tool gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// Number of trailing stderr lines kept for diagnostics.
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,

    /// Whether the shutdown sweep also scans the system process table for
    /// matching executables, not just processes started by this service.
    #[serde(default = "default_sweep_system")]
    pub sweep_system_processes: bool,
}

fn default_terminate_grace_ms() -> u64 {
    5000
}

fn default_stderr_tail_lines() -> usize {
    20
}

fn default_sweep_system() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            terminate_grace_ms: default_terminate_grace_ms(),
            stderr_tail_lines: default_stderr_tail_lines(),
            sweep_system_processes: default_sweep_system(),
        }
    }
}
