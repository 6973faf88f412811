//! Trait definitions for running external tools.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::ProcessError;
use super::types::{LaunchSpec, ToolOutput, ToolProgress};

/// Something that can run build tools to completion.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Run a tool until it exits, is cancelled, or times out.
    ///
    /// A non-zero exit is [`ProcessError::BuildToolFailed`]; a cancelled run
    /// is [`ProcessError::Cancelled`].
    async fn run(
        &self,
        spec: LaunchSpec,
        cancel: CancellationToken,
        progress_tx: Option<mpsc::Sender<ToolProgress>>,
    ) -> Result<ToolOutput, ProcessError>;

    /// Best-effort sweep of processes running one of the given executables.
    async fn kill_all_known(&self, names: &[String]) -> usize;
}
