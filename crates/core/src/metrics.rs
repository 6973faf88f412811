//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Builders (attempts by outcome, build and tool durations)
//! - Task state (transitions published on the change feed)
//! - Process runner (tool launches, orphan kills)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Builder Metrics
// =============================================================================

/// Build attempts by provider and outcome.
pub static BUILDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dirforge_builds_total", "Total build attempts"),
        &["provider", "outcome"], // outcome: "built", "nothing_to_build", "failed", "cancelled"
    )
    .unwrap()
});

/// Duration of a build attempt in seconds.
pub static BUILD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dirforge_build_duration_seconds",
            "Duration of build attempts",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["provider"],
    )
    .unwrap()
});

/// Duration of individual tool runs in seconds.
pub static TOOL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dirforge_tool_duration_seconds",
            "Duration of external tool runs",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["provider", "phase"], // phase: "convert", "compile"
    )
    .unwrap()
});

/// Files copied by deploy steps.
pub static FILES_DEPLOYED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dirforge_files_deployed_total", "Total files deployed"),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Task State Metrics
// =============================================================================

/// State transitions published to status subscribers.
pub static TASK_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dirforge_task_transitions_total",
            "Component task state changes published",
        ),
        &["provider", "status"],
    )
    .unwrap()
});

// =============================================================================
// Process Metrics
// =============================================================================

/// Processes killed by the shutdown sweep.
pub static ORPHANS_KILLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dirforge_orphan_processes_killed_total",
        "Processes killed by the shutdown sweep",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Builder
        Box::new(BUILDS_TOTAL.clone()),
        Box::new(BUILD_DURATION.clone()),
        Box::new(TOOL_DURATION.clone()),
        Box::new(FILES_DEPLOYED.clone()),
        // Task state
        Box::new(TASK_TRANSITIONS.clone()),
        // Process
        Box::new(ORPHANS_KILLED.clone()),
    ]
}
