mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dirforge_core::{
    load_config, validate_config, BundleStore, InstanceLock, Orchestrator, ProcessRunner,
    SqliteBundleStore, ToolInvoker,
};

use api::create_router;
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("DIRFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Single instance: nothing else starts until the lock is held
    let _lock = InstanceLock::acquire(config.lifecycle.lock_path.clone())
        .context("Failed to acquire instance lock")?;
    info!("Instance lock held at {:?}", config.lifecycle.lock_path);

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        providers = config.enabled_count(),
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    // Create SQLite bundle store
    let store: Arc<dyn BundleStore> = Arc::new(
        SqliteBundleStore::new(&config.database.path)
            .context("Failed to create bundle store")?,
    );
    info!("Bundle store initialized");

    let tools: Arc<dyn ToolInvoker> = Arc::new(ProcessRunner::new(config.process.clone()));

    let orchestrator = Arc::new(Orchestrator::new(&config, store, tools));
    orchestrator.start_auto_build();
    info!("Orchestrator started");

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let closing = state.closing().clone();
    let stopping = Arc::clone(&orchestrator);

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Builds are cancelled as soon as the signal arrives, not after the
    // last HTTP request drains
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stopping.begin_shutdown();
            closing.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    orchestrator.shutdown().await;
    info!("Orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
