use std::sync::Arc;

use dirforge_core::{Config, Orchestrator, SanitizedConfig};
use tokio_util::sync::CancellationToken;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    closing: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            closing: CancellationToken::new(),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Cancelled once the server starts shutting down; open sockets close on it.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }
}
