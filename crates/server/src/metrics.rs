//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the acquirer server:
//! - HTTP request metrics (latency, counts)
//! - Acquisition state (collected dynamically)
//! - Core component metrics, registered from `acquirer_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

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
            "acquirer_http_request_duration_seconds",
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
        Opts::new("acquirer_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquirer_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Acquisition State (collected dynamically)
// =============================================================================

/// Acquisition run in progress (1) or idle (0).
pub static ACQUISITION_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquirer_run_in_progress",
        "Whether an acquisition run is in progress (1) or idle (0)",
    )
    .unwrap()
});

/// Periodic job scheduled (1) or stopped (0).
pub static SCHEDULER_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquirer_scheduler_active",
        "Whether the periodic acquisition job is scheduled (1) or stopped (0)",
    )
    .unwrap()
});

/// Downloads queued and awaiting completion.
pub static PENDING_DOWNLOADS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquirer_pending_downloads",
        "Number of downloads awaiting completion",
    )
    .unwrap()
});

/// Keys completed since startup.
pub static COMPLETED_DOWNLOADS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "acquirer_completed_downloads",
        "Number of update keys completed since startup",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server_metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // HTTP
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        // Acquisition
        Box::new(ACQUISITION_RUNNING.clone()),
        Box::new(SCHEDULER_ACTIVE.clone()),
        Box::new(PENDING_DOWNLOADS.clone()),
        Box::new(COMPLETED_DOWNLOADS.clone()),
    ];

    // Core metrics (acquisition runs, daemon, reconciliation, external services)
    for metric in server_metrics
        .into_iter()
        .chain(acquirer_core::metrics::all_metrics())
    {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the coordinator's current
/// snapshot.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let coordinator = state.coordinator();
    let snapshot = coordinator.state();

    ACQUISITION_RUNNING.set(i64::from(snapshot.running));
    SCHEDULER_ACTIVE.set(i64::from(coordinator.is_scheduled()));
    PENDING_DOWNLOADS.set(snapshot.pending.len() as i64);
    COMPLETED_DOWNLOADS.set(snapshot.completed.len() as i64);
}

static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{40}").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = HASH_RE.replace_all(path, "{hash}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
