//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Acquisition runs (queued, skipped, failed titles)
//! - Daemon operations (adds, restrictions, removals)
//! - Reconciliation (completions, orphans, library moves)
//! - External services (indexer, torrent daemon)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Acquisition Metrics
// =============================================================================

/// Acquisition runs total by trigger.
pub static ACQUISITION_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquirer_runs_total", "Total acquisition runs"),
        &["trigger"], // "scheduled", "manual", "skipped"
    )
    .unwrap()
});

/// Acquisition run duration in seconds.
pub static ACQUISITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "acquirer_run_duration_seconds",
            "Duration of a full acquisition run",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &[],
    )
    .unwrap()
});

/// Per-title acquisition outcomes.
pub static TITLES_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "acquirer_titles_processed_total",
            "Titles processed by acquisition runs",
        ),
        &["result"], // "queued", "duplicate", "no_result", "failed"
    )
    .unwrap()
});

// =============================================================================
// Daemon Metrics
// =============================================================================

/// Torrent add attempts by result.
pub static TORRENT_ADDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquirer_torrent_adds_total", "Total torrent add attempts"),
        &["result"], // "added", "restricted", "no_match", "error"
    )
    .unwrap()
});

/// Torrents removed from the daemon after a failed restriction.
pub static TORRENTS_ROLLED_BACK: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "acquirer_torrents_rolled_back_total",
        "Torrents removed after file restriction failed",
    )
    .unwrap()
});

// =============================================================================
// Reconciliation Metrics
// =============================================================================

/// Pending downloads matched to a completed torrent.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "acquirer_downloads_completed_total",
        "Pending downloads matched to a completed torrent",
    )
    .unwrap()
});

/// Completed torrents that matched no pending entry.
pub static ORPHANS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "acquirer_orphans_processed_total",
        "Completed torrents processed without a pending entry",
    )
    .unwrap()
});

/// Library moves by result.
pub static LIBRARY_MOVES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("acquirer_library_moves_total", "Payload moves into the library"),
        &["result"], // "moved", "already_present", "failed"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "acquirer_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Search results returned from the indexer.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "acquirer_search_results",
            "Number of search results returned per query",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record one external call outcome.
pub fn record_external<T, E>(service: &str, operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Acquisition
        Box::new(ACQUISITION_RUNS.clone()),
        Box::new(ACQUISITION_DURATION.clone()),
        Box::new(TITLES_PROCESSED.clone()),
        // Daemon
        Box::new(TORRENT_ADDS.clone()),
        Box::new(TORRENTS_ROLLED_BACK.clone()),
        // Reconciliation
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(ORPHANS_PROCESSED.clone()),
        Box::new(LIBRARY_MOVES.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(SEARCH_RESULTS.clone()),
    ]
}
