//! Per-provider build pipeline.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bundle::{Bundle, BundleStore};
use crate::metrics;
use crate::process::ToolInvoker;
use crate::provider::Provider;
use crate::task::{ComponentTaskState, TaskError, TaskStatus};

use super::config::{DeployConfig, ProviderConfig};
use super::deploy::{deploy_dir, deploy_output};
use super::error::BuildError;
use super::recipe::{recipe_for, BuildRecipe, BuildStep};
use super::types::{split_budget, BuildOutcome, PhaseProgress, StartOutcome};
use super::workspace::BuildWorkspace;

/// Progress granted once the inputs are staged.
const STAGE_WEIGHT: u32 = 10;
/// Progress shared by the tool runs.
const TOOL_BUDGET: u32 = 80;
/// Progress granted after deploy and cleanup.
const FINAL_WEIGHT: u32 = 100 - STAGE_WEIGHT - TOOL_BUDGET;

/// Claim on a bundle, released when dropped.
struct BundleHold {
    store: Arc<dyn BundleStore>,
    provider: Provider,
    id: i64,
}

impl BundleHold {
    fn acquire(store: Arc<dyn BundleStore>, provider: Provider, id: i64) -> Result<Self, BuildError> {
        store.hold(provider, id)?;
        Ok(Self {
            store,
            provider,
            id,
        })
    }
}

impl Drop for BundleHold {
    fn drop(&mut self) {
        self.store.release(self.provider, self.id);
    }
}

/// Drives one provider's pipeline end to end.
///
/// The builder is the only writer of its provider's [`ComponentTaskState`];
/// at most one attempt runs at a time because every attempt begins with
/// [`ComponentTaskState::start`].
pub struct Builder {
    provider: Provider,
    config: ProviderConfig,
    deploy: DeployConfig,
    recipe: Box<dyn BuildRecipe>,
    store: Arc<dyn BundleStore>,
    tools: Arc<dyn ToolInvoker>,
    state: Arc<ComponentTaskState>,
    shutdown: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
    busy: watch::Sender<bool>,
}

impl Builder {
    /// Create a builder. Cancelling `shutdown` cancels any running attempt.
    pub fn new(
        config: ProviderConfig,
        deploy: DeployConfig,
        store: Arc<dyn BundleStore>,
        tools: Arc<dyn ToolInvoker>,
        state: Arc<ComponentTaskState>,
        shutdown: CancellationToken,
    ) -> Self {
        let provider = state.provider();
        let (busy, _) = watch::channel(false);
        Self {
            provider,
            config,
            deploy,
            recipe: recipe_for(provider),
            store,
            tools,
            state,
            shutdown,
            active: Mutex::new(None),
            busy,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ComponentTaskState> {
        &self.state
    }

    /// True while an attempt is running.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    fn active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start an attempt on its own task and return immediately.
    ///
    /// A request while a build is running is ignored, not an error.
    pub fn request_start(self: &Arc<Self>) -> StartOutcome {
        match self.begin() {
            Ok((attempt, token)) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    this.execute(token).await;
                });
                StartOutcome::Started { attempt }
            }
            Err(TaskError::AlreadyInProgress { current_build, .. }) => {
                info!(provider = %self.provider, "Start ignored, already building {}", current_build);
                StartOutcome::AlreadyInProgress { current_build }
            }
        }
    }

    /// Run one attempt on the calling task.
    pub async fn run_once(&self) -> Result<BuildOutcome, TaskError> {
        let (_, token) = self.begin()?;
        Ok(self.execute(token).await)
    }

    /// Cancel the running attempt.
    ///
    /// With nothing running, a provider in Error is reset to Ready instead.
    /// Returns true if an attempt was cancelled.
    pub fn cancel(&self) -> bool {
        let active = self.active();
        match active.as_ref() {
            Some(token) => {
                info!(provider = %self.provider, "Cancelling build");
                token.cancel();
                true
            }
            None => {
                if self.state.status() == TaskStatus::Error {
                    info!(provider = %self.provider, "Clearing error state");
                    self.state.reset();
                }
                false
            }
        }
    }

    /// Wait until no attempt is running. Returns false on timeout.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let mut rx = self.busy.subscribe();
        let idle = matches!(
            tokio::time::timeout(limit, rx.wait_for(|busy| !*busy)).await,
            Ok(Ok(_))
        );
        idle
    }

    fn begin(&self) -> Result<(u64, CancellationToken), TaskError> {
        let attempt = self.state.start(self.provider.as_str())?;
        let token = self.shutdown.child_token();
        *self.active() = Some(token.clone());
        self.busy.send_replace(true);
        Ok((attempt, token))
    }

    async fn execute(&self, token: CancellationToken) -> BuildOutcome {
        let started = Instant::now();
        let result = self.build_oldest(&token).await;

        let outcome = {
            // Transition and clear under the same lock so a new start cannot
            // interleave with the end of this one
            let mut active = self.active();
            let outcome = match result {
                Ok(None) => {
                    info!(provider = %self.provider, "Nothing to build");
                    self.state.complete();
                    BuildOutcome::NothingToBuild
                }
                Ok(Some(label)) => {
                    info!(provider = %self.provider, "Built {} in {:?}", label, started.elapsed());
                    self.state.complete();
                    BuildOutcome::Built { label }
                }
                Err(BuildError::Cancelled) => {
                    info!(provider = %self.provider, "Build cancelled");
                    self.state.reset();
                    BuildOutcome::Cancelled
                }
                Err(e) => {
                    let reason = e.to_string();
                    error!(provider = %self.provider, "Build failed: {}", reason);
                    self.state.fail(reason.clone());
                    BuildOutcome::Failed { reason }
                }
            };
            *active = None;
            self.busy.send_replace(false);
            outcome
        };

        metrics::BUILDS_TOTAL
            .with_label_values(&[self.provider.as_str(), outcome.as_str()])
            .inc();
        metrics::BUILD_DURATION
            .with_label_values(&[self.provider.as_str()])
            .observe(started.elapsed().as_secs_f64());

        outcome
    }

    /// Build the oldest ready bundle, returning its label.
    async fn build_oldest(&self, token: &CancellationToken) -> Result<Option<String>, BuildError> {
        let Some(bundle) = self.store.list_ready_bundles(self.provider)?.into_iter().next() else {
            return Ok(None);
        };

        let label = bundle.label();
        self.state.set_current_build(&label);
        info!(provider = %self.provider, bundle_id = bundle.id, "Building {}", label);

        self.build_bundle(&bundle, token).await?;
        Ok(Some(label))
    }

    async fn build_bundle(&self, bundle: &Bundle, token: &CancellationToken) -> Result<(), BuildError> {
        let _hold = BundleHold::acquire(Arc::clone(&self.store), self.provider, bundle.id)?;
        let workspace = BuildWorkspace::create(&self.config.working_dir, self.provider).await?;

        let result = self.build_in(bundle, &workspace, token).await;
        let cleanup = workspace.cleanup().await;
        match (result, cleanup) {
            (Ok(()), cleanup) => cleanup?,
            (Err(e), Err(cleanup_err)) => {
                warn!(provider = %self.provider, "Workspace cleanup after failure: {}", cleanup_err);
                return Err(e);
            }
            (Err(e), Ok(())) => return Err(e),
        }

        self.store.mark_build_complete(self.provider, bundle.id)?;
        self.state.advance_progress(FINAL_WEIGHT);
        Ok(())
    }

    /// Stage, run the tools and deploy, all inside `workspace`.
    async fn build_in(
        &self,
        bundle: &Bundle,
        workspace: &BuildWorkspace,
        token: &CancellationToken,
    ) -> Result<(), BuildError> {
        let period_dir = self.recipe.period_dir(&bundle.period);

        ensure_not_cancelled(token)?;
        self.stage(bundle, &period_dir, workspace).await?;
        self.state.advance_progress(STAGE_WEIGHT);

        let steps = self.recipe.plan(bundle, workspace, &self.config)?;
        let weights: Vec<u32> = steps.iter().map(|s| s.weight).collect();
        for (step, slice) in steps.into_iter().zip(split_budget(TOOL_BUDGET, &weights)) {
            ensure_not_cancelled(token)?;
            self.run_step(step, slice, token).await?;
        }

        ensure_not_cancelled(token)?;
        if self.deploy.enabled {
            let target = self.deploy.target_dir.as_ref().ok_or_else(|| BuildError::Deploy {
                path: PathBuf::new(),
                reason: "deploy.target_dir is not set".to_string(),
            })?;
            let destination = deploy_dir(target, self.provider, &period_dir);
            let copied = deploy_output(&workspace.output(), &destination).await?;
            metrics::FILES_DEPLOYED
                .with_label_values(&[self.provider.as_str()])
                .inc_by(copied as u64);
        } else {
            debug!(provider = %self.provider, "Deploy disabled");
        }
        Ok(())
    }

    /// Copy the bundle's downloaded files into the workspace.
    async fn stage(&self, bundle: &Bundle, period_dir: &str, workspace: &BuildWorkspace) -> Result<(), BuildError> {
        if bundle.files.is_empty() {
            return Err(BuildError::Staging {
                file: bundle.label(),
                reason: "bundle has no files".to_string(),
            });
        }

        let source_dir = self.config.download_dir.join(period_dir);
        let input = workspace.input();

        for file in &bundle.files {
            let staging_err = |reason: String| BuildError::Staging {
                file: file.file_name.clone(),
                reason,
            };

            if Path::new(&file.file_name).file_name() != Some(OsStr::new(&file.file_name)) {
                return Err(staging_err("not a plain file name".to_string()));
            }
            if !file.on_disk {
                return Err(staging_err("not downloaded yet".to_string()));
            }

            let source = source_dir.join(&file.file_name);
            let bytes = tokio::fs::copy(&source, input.join(&file.file_name))
                .await
                .map_err(|e| staging_err(format!("{}: {}", source.display(), e)))?;
            debug!(provider = %self.provider, "Staged {} ({} bytes)", file.file_name, bytes);
        }

        Ok(())
    }

    async fn run_step(&self, step: BuildStep, slice: u32, token: &CancellationToken) -> Result<(), BuildError> {
        let phase = step.phase.as_str();
        info!(provider = %self.provider, phase, "Running {}", step.spec.name());

        let (tx, mut rx) = mpsc::channel(32);
        let mut tracker = PhaseProgress::new(slice);
        let started = Instant::now();

        let mut run = self.tools.run(step.spec, token.clone(), Some(tx));
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(progress) = rx.recv() => {
                    let delta = tracker.update(progress.percent);
                    if delta > 0 {
                        self.state.advance_progress(delta);
                    }
                }
            }
        };

        metrics::TOOL_DURATION
            .with_label_values(&[self.provider.as_str(), phase])
            .observe(started.elapsed().as_secs_f64());

        let output = result?;
        self.state.advance_progress(tracker.finish());
        debug!(
            provider = %self.provider,
            phase,
            "{} finished in {} ms",
            output.program,
            output.duration_ms
        );
        Ok(())
    }
}

fn ensure_not_cancelled(token: &CancellationToken) -> Result<(), BuildError> {
    if token.is_cancelled() {
        Err(BuildError::Cancelled)
    } else {
        Ok(())
    }
}
