//! Mock tool invoker for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::process::{LaunchSpec, ProcessError, ToolInvoker, ToolOutput, ToolProgress};

/// What a mocked tool does when run.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Report the given progress values, optionally create a file in the
    /// directory named by the last argument, then exit 0.
    Succeed {
        progress: Vec<u8>,
        creates: Option<String>,
    },
    /// Exit with a non-zero code.
    Fail {
        exit_code: i32,
        stderr: Option<String>,
    },
    /// Fail to launch, as if the executable were missing.
    LaunchFail,
    /// Run until cancelled.
    Hang,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self::Succeed {
            progress: Vec::new(),
            creates: None,
        }
    }
}

/// Mock implementation of the ToolInvoker trait.
///
/// Behavior is configured per executable name; unconfigured tools succeed.
/// Every run is recorded for assertions.
///
/// # Example
///
/// ```rust,ignore
/// use dirforge_core::testing::{MockBehavior, MockToolInvoker};
///
/// let tools = MockToolInvoker::new();
/// tools.set_behavior("compile", MockBehavior::Fail { exit_code: 1, stderr: None }).await;
///
/// // Run a build...
///
/// assert_eq!(tools.calls().await.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockToolInvoker {
    behaviors: Arc<RwLock<HashMap<String, MockBehavior>>>,
    calls: Arc<RwLock<Vec<LaunchSpec>>>,
    kill_requests: Arc<RwLock<Vec<Vec<String>>>>,
}

impl MockToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure how the tool with this executable name behaves.
    pub async fn set_behavior(&self, name: &str, behavior: MockBehavior) {
        self.behaviors
            .write()
            .await
            .insert(name.to_string(), behavior);
    }

    /// All recorded runs, in order.
    pub async fn calls(&self) -> Vec<LaunchSpec> {
        self.calls.read().await.clone()
    }

    /// Name lists passed to `kill_all_known`.
    pub async fn kill_requests(&self) -> Vec<Vec<String>> {
        self.kill_requests.read().await.clone()
    }

    /// Wait until at least `count` runs have started.
    ///
    /// Panics after five seconds.
    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..500 {
            if self.calls.read().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} tool runs", count);
    }

    async fn behavior_for(&self, name: &str) -> MockBehavior {
        self.behaviors
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolInvoker for MockToolInvoker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        spec: LaunchSpec,
        cancel: CancellationToken,
        progress_tx: Option<mpsc::Sender<ToolProgress>>,
    ) -> Result<ToolOutput, ProcessError> {
        let name = spec.name();
        let behavior = self.behavior_for(&name).await;
        self.calls.write().await.push(spec.clone());

        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        match behavior {
            MockBehavior::Succeed { progress, creates } => {
                if let Some(tx) = progress_tx {
                    for percent in progress {
                        let _ = tx.send(ToolProgress { percent }).await;
                    }
                }
                if let (Some(file), Some(dir)) = (creates, spec.args.last()) {
                    let dir = Path::new(dir);
                    if dir.is_dir() {
                        tokio::fs::write(dir.join(file), b"mock output").await?;
                    }
                }
                Ok(ToolOutput {
                    program: name,
                    exit_code: 0,
                    duration_ms: 1,
                    stderr_tail: Vec::new(),
                })
            }
            MockBehavior::Fail { exit_code, stderr } => {
                Err(ProcessError::BuildToolFailed { exit_code, stderr })
            }
            MockBehavior::LaunchFail => Err(ProcessError::LaunchFailed {
                program: spec.program,
                reason: "No such file or directory".to_string(),
            }),
            MockBehavior::Hang => {
                cancel.cancelled().await;
                Err(ProcessError::Cancelled)
            }
        }
    }

    async fn kill_all_known(&self, names: &[String]) -> usize {
        self.kill_requests.write().await.push(names.to_vec());
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_behavior_succeeds() {
        let tools = MockToolInvoker::new();
        let output = tools
            .run(LaunchSpec::new("/opt/compile"), CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(output.program, "compile");
        assert_eq!(tools.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_forwarded() {
        let tools = MockToolInvoker::new();
        tools
            .set_behavior(
                "convert",
                MockBehavior::Succeed {
                    progress: vec![20, 90],
                    creates: None,
                },
            )
            .await;
        let (tx, mut rx) = mpsc::channel(8);

        tools
            .run(LaunchSpec::new("convert"), CancellationToken::new(), Some(tx))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().percent, 20);
        assert_eq!(rx.recv().await.unwrap().percent, 90);
    }

    #[tokio::test]
    async fn test_hang_until_cancelled() {
        let tools = Arc::new(MockToolInvoker::new());
        tools.set_behavior("compile", MockBehavior::Hang).await;
        let cancel = CancellationToken::new();

        let runner = {
            let tools = tools.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { tools.run(LaunchSpec::new("compile"), cancel, None).await })
        };
        tools.wait_for_calls(1).await;
        cancel.cancel();

        let err = runner.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_failure_behavior() {
        let tools = MockToolInvoker::new();
        tools
            .set_behavior(
                "compile",
                MockBehavior::Fail {
                    exit_code: 1,
                    stderr: Some("bad input".into()),
                },
            )
            .await;
        let err = tools
            .run(LaunchSpec::new("compile"), CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }
}
