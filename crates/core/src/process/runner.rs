//! tokio-based supervisor for external build tools.

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::ProcessConfig;
use super::error::ProcessError;
use super::traits::ToolInvoker;
use super::types::{executable_name, parse_progress_line, LaunchSpec, ToolOutput, ToolProgress};

/// How long to wait for output readers after the process is gone.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A launched tool that has not been waited on yet.
#[derive(Debug)]
pub struct ToolHandle {
    child: Child,
    pid: Option<u32>,
    name: String,
    started: Instant,
    timeout: Option<Duration>,
}

impl ToolHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

enum WaitOutcome {
    Exited(Result<std::process::ExitStatus, ProcessError>),
    Cancelled,
    TimedOut(Duration),
}

/// Launches, monitors and terminates external tools.
///
/// Every child is registered by pid and executable name while it runs, so
/// [`kill_all_known`](Self::kill_all_known) can reap anything that outlived
/// its build.
pub struct ProcessRunner {
    config: ProcessConfig,
    registry: Arc<Mutex<HashMap<u32, String>>>,
}

impl ProcessRunner {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ProcessConfig::default())
    }

    fn register(&self, pid: u32, name: &str) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.insert(pid, name.to_string());
        }
    }

    fn unregister(&self, pid: Option<u32>) {
        if let (Some(pid), Ok(mut registry)) = (pid, self.registry.lock()) {
            registry.remove(&pid);
        }
    }

    /// Number of children currently registered.
    pub fn running_count(&self) -> usize {
        self.registry.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Spawn a tool with captured output.
    pub fn launch(&self, spec: &LaunchSpec) -> Result<ToolHandle, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| ProcessError::LaunchFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let name = spec.name();
        let pid = child.id();
        if let Some(pid) = pid {
            self.register(pid, &name);
        }
        info!("Launched {} (pid {:?}) with args {:?}", name, pid, spec.args);

        Ok(ToolHandle {
            child,
            pid,
            name,
            started: Instant::now(),
            timeout: spec.timeout,
        })
    }

    /// Wait for a launched tool to exit.
    ///
    /// Progress lines on stdout are forwarded to `progress_tx` without
    /// blocking. On cancellation or timeout the tool is terminated.
    pub async fn wait(
        &self,
        mut handle: ToolHandle,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<ToolProgress>>,
    ) -> Result<ToolOutput, ProcessError> {
        let stdout_task = handle
            .child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_progress(out, handle.name.clone(), progress_tx)));
        let stderr_task = handle
            .child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_tail(err, self.config.stderr_tail_lines)));

        let deadline = handle.timeout;
        let outcome = tokio::select! {
            status = handle.child.wait() => WaitOutcome::Exited(status.map_err(ProcessError::from)),
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = sleep_or_forever(deadline) => WaitOutcome::TimedOut(deadline.unwrap_or_default()),
        };

        let result = match outcome {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::Cancelled => {
                info!("Cancelling {} (pid {:?})", handle.name, handle.pid);
                self.terminate(&mut handle).await;
                Err(ProcessError::Cancelled)
            }
            WaitOutcome::TimedOut(after) => {
                warn!("{} timed out after {:?}", handle.name, after);
                self.terminate(&mut handle).await;
                Err(ProcessError::Timeout {
                    secs: after.as_secs(),
                })
            }
        };
        self.unregister(handle.pid);

        if let Some(task) = stdout_task {
            drain(task).await;
        }
        let stderr_tail = match stderr_task {
            Some(task) => drain(task).await.unwrap_or_default(),
            None => Vec::new(),
        };

        let status = result?;
        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = handle.started.elapsed().as_millis() as u64;

        if !status.success() {
            warn!(
                "{} exited with code {} after {} ms",
                handle.name, exit_code, duration_ms
            );
            return Err(ProcessError::BuildToolFailed {
                exit_code,
                stderr: if stderr_tail.is_empty() {
                    None
                } else {
                    Some(stderr_tail.join("\n"))
                },
            });
        }

        info!("{} finished in {} ms", handle.name, duration_ms);
        Ok(ToolOutput {
            program: handle.name,
            exit_code,
            duration_ms,
            stderr_tail,
        })
    }

    /// Launch and wait in one step.
    pub async fn run(
        &self,
        spec: &LaunchSpec,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<ToolProgress>>,
    ) -> Result<ToolOutput, ProcessError> {
        let handle = self.launch(spec)?;
        self.wait(handle, cancel, progress_tx).await
    }

    /// Ask the tool to stop, then kill it if it ignores the request.
    async fn terminate(&self, handle: &mut ToolHandle) {
        let grace = Duration::from_millis(self.config.terminate_grace_ms);
        if request_stop(handle, grace).await {
            return;
        }
        if let Err(e) = handle.child.kill().await {
            warn!("Failed to kill {} (pid {:?}): {}", handle.name, handle.pid, e);
        }
    }

    /// Kill every known process running one of the given executables.
    ///
    /// Best effort: failures are logged and skipped. Returns the number of
    /// processes signalled.
    pub async fn kill_all_known(&self, names: &[String]) -> usize {
        let targets: Vec<(u32, String)> = match self.registry.lock() {
            Ok(registry) => registry
                .iter()
                .filter(|(_, name)| names.iter().any(|n| n == *name))
                .map(|(pid, name)| (*pid, name.clone()))
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut killed = 0;
        let mut seen = Vec::new();
        for (pid, name) in targets {
            warn!("Killing orphaned {} (pid {})", name, pid);
            if send_signal(pid, "KILL").await {
                killed += 1;
            }
            seen.push(pid);
        }

        if self.config.sweep_system_processes {
            for (pid, name) in system_processes_named(names) {
                if seen.contains(&pid) {
                    continue;
                }
                warn!("Killing stray {} (pid {})", name, pid);
                if send_signal(pid, "KILL").await {
                    killed += 1;
                }
            }
        }

        killed
    }
}

#[async_trait]
impl ToolInvoker for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(
        &self,
        spec: LaunchSpec,
        cancel: CancellationToken,
        progress_tx: Option<mpsc::Sender<ToolProgress>>,
    ) -> Result<ToolOutput, ProcessError> {
        ProcessRunner::run(self, &spec, &cancel, progress_tx).await
    }

    async fn kill_all_known(&self, names: &[String]) -> usize {
        ProcessRunner::kill_all_known(self, names).await
    }
}

/// SIGTERM, then wait up to `grace` for the tool to exit.
#[cfg(unix)]
async fn request_stop(handle: &mut ToolHandle, grace: Duration) -> bool {
    let Some(pid) = handle.pid else {
        return false;
    };
    send_signal(pid, "TERM").await;
    match timeout(grace, handle.child.wait()).await {
        Ok(Ok(status)) => {
            debug!("{} stopped after SIGTERM: {}", handle.name, status);
            true
        }
        Ok(Err(e)) => {
            warn!("Waiting for {} failed: {}", handle.name, e);
            false
        }
        Err(_) => {
            warn!("{} ignored SIGTERM for {:?}, killing", handle.name, grace);
            false
        }
    }
}

#[cfg(not(unix))]
async fn request_stop(_handle: &mut ToolHandle, _grace: Duration) -> bool {
    false
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

/// Join a reader task, giving up if an inherited pipe keeps it open.
async fn drain<T>(mut task: JoinHandle<T>) -> Option<T> {
    match timeout(READER_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Output reader failed: {}", e);
            None
        }
        Err(_) => {
            task.abort();
            None
        }
    }
}

async fn forward_progress<R>(stream: R, name: String, progress_tx: Option<mpsc::Sender<ToolProgress>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!("{}: {}", name, line);
        if let (Some(tx), Some(percent)) = (&progress_tx, parse_progress_line(&line)) {
            // Non-blocking; a slow consumer must not stall the tool's pipe
            let _ = tx.try_send(ToolProgress { percent });
        }
    }
}

async fn collect_tail<R>(stream: R, keep: usize) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// Send a signal through the system `kill` utility.
#[cfg(unix)]
async fn send_signal(pid: u32, signal: &str) -> bool {
    match Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Failed to send SIG{} to {}: {}", signal, pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
async fn send_signal(pid: u32, _signal: &str) -> bool {
    match Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Failed to kill {}: {}", pid, e);
            false
        }
    }
}

/// Processes in the system table whose executable matches one of `names`.
#[cfg(target_os = "linux")]
fn system_processes_named(names: &[String]) -> Vec<(u32, String)> {
    // /proc/<pid>/comm holds at most 15 bytes of the executable name
    const COMM_LEN: usize = 15;
    let own_pid = std::process::id();

    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan /proc: {}", e);
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            if pid == own_pid {
                return None;
            }
            let comm = std::fs::read_to_string(entry.path().join("comm")).ok()?;
            let comm = comm.trim();
            names
                .iter()
                .find(|n| {
                    let n = n.as_str();
                    n == comm || (n.len() > COMM_LEN && n.get(..COMM_LEN) == Some(comm))
                })
                .map(|n| (pid, n.clone()))
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn system_processes_named(_names: &[String]) -> Vec<(u32, String)> {
    Vec::new()
}

/// Executable names of the configured tools, for the shutdown sweep.
pub fn tool_names<'a, I>(programs: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a std::path::Path>,
{
    let mut names: Vec<String> = programs.into_iter().map(executable_name).collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn test_runner() -> ProcessRunner {
        ProcessRunner::new(ProcessConfig {
            terminate_grace_ms: 500,
            stderr_tail_lines: 5,
            sweep_system_processes: false,
        })
    }

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_successful_run_reports_progress() {
        let runner = test_runner();
        let (tx, mut rx) = mpsc::channel(16);
        let output = runner
            .run(
                &sh("echo 'PROGRESS 25'; echo 'compiling'; echo 'PROGRESS 80'"),
                &CancellationToken::new(),
                Some(tx),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.program, "sh");

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p.percent);
        }
        assert_eq!(seen, vec![25, 80]);
        assert_eq!(runner.running_count(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_build_tool_failed() {
        let runner = test_runner();
        let err = runner
            .run(&sh("echo 'bad record' >&2; exit 3"), &CancellationToken::new(), None)
            .await
            .unwrap_err();

        match err {
            ProcessError::BuildToolFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr.as_deref(), Some("bad record"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let runner = test_runner();
        let err = runner
            .run(
                &sh("for i in 1 2 3 4 5 6 7 8; do echo line$i >&2; done; exit 1"),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();

        if let ProcessError::BuildToolFailed { stderr: Some(stderr), .. } = err {
            assert_eq!(stderr, "line4\nline5\nline6\nline7\nline8");
        } else {
            panic!("expected stderr tail");
        }
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_failed() {
        let runner = test_runner();
        let err = runner
            .run(
                &LaunchSpec::new("/nonexistent/dircompile"),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_terminates_tool() {
        let runner = test_runner();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = runner
            .run(&sh("exec sleep 30"), &cancel, None)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(runner.running_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let runner = test_runner();
        let spec = sh("exec sleep 30").with_timeout(Some(Duration::from_millis(200)));
        let err = runner
            .run(&spec, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_kill_all_known_reaps_registered_children() {
        let runner = test_runner();
        let handle = runner.launch(&LaunchSpec::new("sleep").with_args(["30"])).unwrap();
        assert_eq!(runner.running_count(), 1);

        let killed = runner.kill_all_known(&["sleep".to_string()]).await;
        assert_eq!(killed, 1);

        let err = runner
            .wait(handle, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(-1));
    }

    #[tokio::test]
    async fn test_kill_all_known_ignores_other_names() {
        let runner = test_runner();
        let handle = runner.launch(&sh("exec sleep 1")).unwrap();
        let killed = runner.kill_all_known(&["dircompile".to_string()]).await;
        assert_eq!(killed, 0);
        drop(handle);
    }

    #[test]
    fn test_tool_names_dedup() {
        use std::path::Path;
        let names = tool_names([
            Path::new("/opt/a/compiler"),
            Path::new("/opt/b/compiler"),
            Path::new("convert"),
        ]);
        assert_eq!(names, vec!["compiler", "convert"]);
    }
}
