//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the dirforge server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection and command metrics
//! - Provider build status (collected dynamically)
//!
//! Build and tool metrics recorded by the core crate are registered here too.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use tracing::error;

use dirforge_core::{Provider, TaskStatus};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dirforge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dirforge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dirforge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dirforge_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dirforge_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dirforge_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// Client commands received, by action and result.
pub static WS_COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dirforge_ws_commands_total", "Client commands received"),
        &["action", "result"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dirforge_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Provider Metrics (collected dynamically)
// =============================================================================

/// 1 for each provider's current status, 0 for the others.
pub static PROVIDER_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("dirforge_provider_status", "Current build status by provider"),
        &["provider", "status"],
    )
    .unwrap()
});

/// Progress of the current build, 0-100.
pub static PROVIDER_PROGRESS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("dirforge_provider_progress", "Current build progress by provider"),
        &["provider"],
    )
    .unwrap()
});

/// Ready bundles waiting to be built.
pub static PROVIDER_AVAILABLE_BUILDS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "dirforge_provider_available_builds",
            "Ready bundles not yet built, by provider",
        ),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_COMMANDS_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Providers
    registry
        .register(Box::new(PROVIDER_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(PROVIDER_PROGRESS.clone()))
        .unwrap();
    registry
        .register(Box::new(PROVIDER_AVAILABLE_BUILDS.clone()))
        .unwrap();

    // Core metrics (builds, tools, task transitions)
    for metric in dirforge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the provider gauges match the live snapshot.
pub fn collect_dynamic_metrics(state: &AppState) {
    let snapshot = state.orchestrator().snapshot();

    for provider in Provider::ALL {
        let Some(status) = snapshot.get(provider) else {
            continue;
        };
        let name = provider.as_str();

        for candidate in [TaskStatus::Ready, TaskStatus::InProgress, TaskStatus::Error] {
            PROVIDER_STATUS
                .with_label_values(&[name, candidate.as_str()])
                .set(i64::from(candidate == status.status));
        }
        PROVIDER_PROGRESS
            .with_label_values(&[name])
            .set(i64::from(status.progress));
        PROVIDER_AVAILABLE_BUILDS
            .with_label_values(&[name])
            .set(status.available_builds.len() as i64);
    }
}
