//! Build orchestrator implementation.
//!
//! Owns every provider's task state and builder:
//! - Commands: routed to the provider's builder, never blocking the caller
//! - Auto-build: one polling task per enabled provider (optional)
//! - Shutdown: cancel, wait for builders, then sweep leftover tool processes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::{recipe_for, Builder, BuilderConfig};
use crate::bundle::BundleStore;
use crate::config::Config;
use crate::metrics;
use crate::process::{tool_names, ToolInvoker};
use crate::provider::Provider;
use crate::status::{Action, Command, StatusBoard, StatusSnapshot};
use crate::task::{ChangeFeed, ComponentTaskState, TaskStatus};

use super::config::LifecycleConfig;
use super::types::{CommandOutcome, DispatchError};

/// The build orchestrator - one builder per enabled provider plus the status
/// board the server reads from.
pub struct Orchestrator {
    builders: HashMap<Provider, Arc<Builder>>,
    board: Arc<StatusBoard>,
    store: Arc<dyn BundleStore>,
    tools: Arc<dyn ToolInvoker>,
    tool_names: Vec<String>,
    lifecycle: LifecycleConfig,
    builder_config: BuilderConfig,
    shutdown: CancellationToken,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create task states for every provider and builders for the enabled ones.
    pub fn new(config: &Config, store: Arc<dyn BundleStore>, tools: Arc<dyn ToolInvoker>) -> Self {
        let feed = ChangeFeed::default();
        let shutdown = CancellationToken::new();

        let states: Vec<Arc<ComponentTaskState>> = Provider::ALL
            .into_iter()
            .map(|p| Arc::new(ComponentTaskState::new(p, feed.clone())))
            .collect();

        let mut builders = HashMap::new();
        let mut programs = Vec::new();
        for state in &states {
            let provider = state.provider();
            let Some(provider_config) = config.providers.get(provider).filter(|c| c.enabled) else {
                info!(provider = %provider, "Provider disabled");
                continue;
            };

            programs.push(provider_config.compiler_path.clone());
            if recipe_for(provider).converts() {
                programs.extend(provider_config.converter_path.clone());
            }

            let builder = Builder::new(
                provider_config.clone(),
                config.deploy.clone(),
                Arc::clone(&store),
                Arc::clone(&tools),
                Arc::clone(state),
                shutdown.clone(),
            );
            builders.insert(provider, Arc::new(builder));
        }

        let board = Arc::new(StatusBoard::new(states, Arc::clone(&store), feed));

        Self {
            builders,
            board,
            store,
            tools,
            tool_names: tool_names(programs.iter().map(|p| p.as_path())),
            lifecycle: config.lifecycle.clone(),
            builder_config: config.builder.clone(),
            shutdown,
            pollers: Mutex::new(Vec::new()),
        }
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.board.snapshot()
    }

    pub fn builder(&self, provider: Provider) -> Option<&Arc<Builder>> {
        self.builders.get(&provider)
    }

    /// Executable names swept at shutdown.
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Route a validated command to its provider.
    ///
    /// Never waits for a build; `start` spawns it on its own task.
    pub fn dispatch(&self, command: Command) -> Result<CommandOutcome, DispatchError> {
        if command.action == Action::Status {
            return Ok(CommandOutcome::Status);
        }
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }

        let builder = self
            .builders
            .get(&command.provider)
            .ok_or(DispatchError::ProviderDisabled(command.provider))?;

        debug!(provider = %command.provider, action = %command.action, "Dispatching command");
        let outcome = match command.action {
            Action::Start => CommandOutcome::Start(builder.request_start()),
            Action::Cancel => CommandOutcome::Cancel(builder.cancel()),
            Action::Status => CommandOutcome::Status,
        };
        Ok(outcome)
    }

    /// Spawn the polling loops if `builder.poll_interval_secs` is set.
    pub fn start_auto_build(&self) {
        let Some(interval) = self.builder_config.poll_interval() else {
            info!("Automatic builds disabled");
            return;
        };

        let mut pollers = self.pollers.lock().unwrap_or_else(|p| p.into_inner());
        if !pollers.is_empty() {
            warn!("Automatic builds already running");
            return;
        }

        for builder in self.builders.values() {
            pollers.push(spawn_poller(
                Arc::clone(builder),
                Arc::clone(&self.store),
                interval,
                self.shutdown.clone(),
            ));
        }
        info!("Automatic builds every {:?} for {} providers", interval, pollers.len());
    }

    /// Cancel every running build and refuse new ones, without waiting.
    ///
    /// Safe to call before `shutdown`, which then only waits and sweeps.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Cancelling builders");
            self.shutdown.cancel();
        }
    }

    /// Cancel all builds, wait up to the grace period, then kill leftover tools.
    pub async fn shutdown(&self) {
        info!("Shutting down builders");
        self.begin_shutdown();

        let grace = self.lifecycle.shutdown_grace();
        let waits = self.builders.values().map(|b| {
            let builder = Arc::clone(b);
            async move { (builder.provider(), builder.wait_idle(grace).await) }
        });
        for (provider, stopped) in join_all(waits).await {
            if !stopped {
                warn!(provider = %provider, "Builder still running after {:?}", grace);
            }
        }

        let pollers: Vec<_> = self
            .pollers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for poller in pollers {
            if let Err(e) = poller.await {
                warn!("Poller ended abnormally: {}", e);
            }
        }

        let killed = self.tools.kill_all_known(&self.tool_names).await;
        if killed > 0 {
            warn!("Killed {} leftover tool processes", killed);
            metrics::ORPHANS_KILLED.inc_by(killed as u64);
        }
        info!("Builders stopped");
    }
}

fn spawn_poller(
    builder: Arc<Builder>,
    store: Arc<dyn BundleStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let provider = builder.provider();
        info!(provider = %provider, "Auto-build loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(provider = %provider, "Auto-build loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if builder.state().status() == TaskStatus::InProgress {
                        continue;
                    }
                    match store.list_ready_bundles(provider) {
                        Ok(bundles) if !bundles.is_empty() => {
                            builder.request_start();
                        }
                        Ok(_) => {}
                        Err(e) => warn!(provider = %provider, "Auto-build check failed: {}", e),
                    }
                }
            }
        }
        info!(provider = %provider, "Auto-build loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProviderConfig;
    use crate::bundle::{Period, SqliteBundleStore};
    use crate::testing::{fixtures, MockBehavior, MockToolInvoker};
    use tempfile::TempDir;

    struct Harness {
        root: TempDir,
        store: Arc<SqliteBundleStore>,
        tools: Arc<MockToolInvoker>,
        orchestrator: Orchestrator,
    }

    fn harness(configure: impl FnOnce(&mut Config, &std::path::Path)) -> Harness {
        let root = TempDir::new().unwrap();
        let mut config = Config::default();
        config.lifecycle.shutdown_grace_secs = 5;
        config.providers.set(
            Provider::Parascript,
            fixtures::provider_config(root.path(), Provider::Parascript),
        );
        config.providers.set(
            Provider::RoyalMail,
            fixtures::provider_config(root.path(), Provider::RoyalMail),
        );
        configure(&mut config, root.path());

        let store = Arc::new(SqliteBundleStore::in_memory().unwrap());
        let tools = Arc::new(MockToolInvoker::new());
        let orchestrator = Orchestrator::new(&config, store.clone(), tools.clone());
        Harness {
            root,
            store,
            tools,
            orchestrator,
        }
    }

    fn downloads(h: &Harness, provider: Provider) -> std::path::PathBuf {
        h.root.path().join("downloads").join(provider.as_str())
    }

    #[test]
    fn test_snapshot_includes_disabled_providers() {
        let h = harness(|_, _| {});
        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.providers.len(), 3);
        assert!(h.orchestrator.builder(Provider::SmartMatch).is_none());
        assert!(h.orchestrator.builder(Provider::Parascript).is_some());
    }

    #[test]
    fn test_tool_names_cover_enabled_providers() {
        let h = harness(|_, _| {});
        assert_eq!(h.orchestrator.tool_names(), &["compile".to_string(), "convert".to_string()]);
    }

    #[tokio::test]
    async fn test_start_on_disabled_provider_is_rejected() {
        let h = harness(|_, _| {});
        let err = h
            .orchestrator
            .dispatch(Command {
                provider: Provider::SmartMatch,
                action: Action::Start,
            })
            .unwrap_err();
        assert_eq!(err, DispatchError::ProviderDisabled(Provider::SmartMatch));
    }

    #[tokio::test]
    async fn test_status_is_always_allowed() {
        let h = harness(|_, _| {});
        let outcome = h
            .orchestrator
            .dispatch(Command {
                provider: Provider::SmartMatch,
                action: Action::Status,
            })
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Status);
    }

    #[tokio::test]
    async fn test_start_then_cancel() {
        let h = harness(|_, _| {});
        fixtures::ready_bundle(
            h.store.as_ref(),
            &downloads(&h, Provider::Parascript),
            Provider::Parascript,
            Period::new(2024, 1),
        );
        h.tools.set_behavior("compile", MockBehavior::Hang).await;

        let start = Command {
            provider: Provider::Parascript,
            action: Action::Start,
        };
        assert!(matches!(
            h.orchestrator.dispatch(start).unwrap(),
            CommandOutcome::Start(crate::builder::StartOutcome::Started { .. })
        ));
        h.tools.wait_for_calls(1).await;

        let cancel = Command {
            provider: Provider::Parascript,
            action: Action::Cancel,
        };
        assert_eq!(h.orchestrator.dispatch(cancel).unwrap(), CommandOutcome::Cancel(true));

        let builder = h.orchestrator.builder(Provider::Parascript).unwrap();
        assert!(builder.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(builder.state().status(), TaskStatus::Ready);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_sweeps() {
        let h = harness(|_, _| {});
        fixtures::ready_bundle(
            h.store.as_ref(),
            &downloads(&h, Provider::Parascript),
            Provider::Parascript,
            Period::new(2024, 1),
        );
        h.tools.set_behavior("compile", MockBehavior::Hang).await;
        h.orchestrator
            .dispatch(Command {
                provider: Provider::Parascript,
                action: Action::Start,
            })
            .unwrap();
        h.tools.wait_for_calls(1).await;

        h.orchestrator.shutdown().await;

        let state = h.orchestrator.board().task(Provider::Parascript).unwrap();
        assert_eq!(state.status, TaskStatus::Ready);
        assert_eq!(
            h.tools.kill_requests().await,
            vec![vec!["compile".to_string(), "convert".to_string()]]
        );
        assert_eq!(
            h.orchestrator
                .dispatch(Command {
                    provider: Provider::Parascript,
                    action: Action::Start,
                })
                .unwrap_err(),
            DispatchError::ShuttingDown
        );
    }

    #[tokio::test]
    async fn test_begin_shutdown_cancels_without_waiting() {
        let h = harness(|_, _| {});
        fixtures::ready_bundle(
            h.store.as_ref(),
            &downloads(&h, Provider::RoyalMail),
            Provider::RoyalMail,
            Period::new(2024, 1),
        );
        h.tools.set_behavior("compile", MockBehavior::Hang).await;
        h.orchestrator
            .dispatch(Command {
                provider: Provider::RoyalMail,
                action: Action::Start,
            })
            .unwrap();
        h.tools.wait_for_calls(2).await;

        h.orchestrator.begin_shutdown();
        assert!(h.orchestrator.is_shutting_down());

        let builder = h.orchestrator.builder(Provider::RoyalMail).unwrap();
        assert!(builder.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(builder.state().status(), TaskStatus::Ready);
        // Nothing swept yet; that is left to `shutdown`
        assert!(h.tools.kill_requests().await.is_empty());

        h.orchestrator.shutdown().await;
        assert_eq!(h.tools.kill_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_build_picks_up_ready_bundle() {
        let h = harness(|config, _| {
            config.builder.poll_interval_secs = 1;
        });
        let bundle = fixtures::ready_bundle(
            h.store.as_ref(),
            &downloads(&h, Provider::RoyalMail),
            Provider::RoyalMail,
            Period::new(2024, 2),
        );

        h.orchestrator.start_auto_build();

        let mut built = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if h.store.get_bundle(Provider::RoyalMail, bundle.id).unwrap().is_build_complete {
                built = true;
                break;
            }
        }
        assert!(built);
        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_flag_skips_builder() {
        let h = harness(|config, root| {
            let mut sm = ProviderConfig::new(root.join("sm"), "/opt/sm/compile");
            sm.enabled = false;
            config.providers.set(Provider::SmartMatch, sm);
        });
        assert!(h.orchestrator.builder(Provider::SmartMatch).is_none());
    }
}
