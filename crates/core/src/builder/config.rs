//! Builder configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every provider's builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// How often to look for ready bundles (seconds).
    /// 0 disables automatic builds; builds then start only on request.
    #[serde(default)]
    pub poll_interval_secs: u64,
}

impl BuilderConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// Where finished directories are copied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Copy build output to `target_dir` after a successful compile.
    #[serde(default)]
    pub enabled: bool,

    /// Output lands in `<target_dir>/<provider>/<period>/`.
    #[serde(default)]
    pub target_dir: Option<PathBuf>,
}

/// Per-provider pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Root of the crawler's downloads; files live under `<download_dir>/<period>/`.
    pub download_dir: PathBuf,

    /// Parent of the per-build working directories.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Data conversion tool. Ignored by providers that compile raw files.
    #[serde(default)]
    pub converter_path: Option<PathBuf>,

    /// Argument template for the converter.
    #[serde(default = "default_converter_args")]
    pub converter_args: String,

    /// Directory compiler.
    pub compiler_path: PathBuf,

    /// Argument template for the compiler.
    #[serde(default = "default_compiler_args")]
    pub compiler_args: String,

    /// Per-tool time limit in seconds (0 = none).
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_working_dir() -> PathBuf {
    std::env::temp_dir().join("dirforge")
}

fn default_converter_args() -> String {
    "{input} {output}".to_string()
}

fn default_compiler_args() -> String {
    "{input} {output}".to_string()
}

impl ProviderConfig {
    pub fn new(download_dir: impl Into<PathBuf>, compiler_path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            download_dir: download_dir.into(),
            working_dir: default_working_dir(),
            converter_path: None,
            converter_args: default_converter_args(),
            compiler_path: compiler_path.into(),
            compiler_args: default_compiler_args(),
            timeout_secs: 0,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
