//! Prometheus Metrics Definitions
//!
//! Defines all Stash metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<StashMetrics>> = Lazy::new(StashMetrics::new);

/// Run `f` against the global metrics if they registered successfully.
pub fn with_metrics(f: impl FnOnce(&StashMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Container for all Stash metrics.
#[derive(Clone)]
pub struct StashMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Retrieval outcomes - labels: outcome (streamed, empty, not_found)
    pub retrievals_total: CounterVec,

    /// Cache entries deleted because their location went stale
    pub invalidations_total: Counter,

    /// Upstream stream lifecycle - labels: event (opened, released)
    pub upstream_streams_total: CounterVec,

    /// Refresh job runs - labels: status (completed, failed, cancelled)
    pub refresh_jobs_total: CounterVec,
}

fn register_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

impl StashMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "stash_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| register_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "stash_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_error("http_request_duration_seconds", e))?,

            retrievals_total: register_counter_vec!(
                "stash_retrievals_total",
                "Download retrievals by outcome",
                &["outcome"]
            )
            .map_err(|e| register_error("retrievals_total", e))?,

            invalidations_total: register_counter!(
                "stash_invalidations_total",
                "Cache entries invalidated after their location went stale"
            )
            .map_err(|e| register_error("invalidations_total", e))?,

            upstream_streams_total: register_counter_vec!(
                "stash_upstream_streams_total",
                "Upstream byte streams opened and released",
                &["event"]
            )
            .map_err(|e| register_error("upstream_streams_total", e))?,

            refresh_jobs_total: register_counter_vec!(
                "stash_refresh_jobs_total",
                "Full cache refresh runs by status",
                &["status"]
            )
            .map_err(|e| register_error("refresh_jobs_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a retrieval outcome.
    pub fn record_retrieval(&self, outcome: &str) {
        self.retrievals_total.with_label_values(&[outcome]).inc();
    }

    /// Record an invalidation.
    pub fn record_invalidation(&self) {
        self.invalidations_total.inc();
    }

    /// Record an upstream stream being opened.
    pub fn stream_opened(&self) {
        self.upstream_streams_total.with_label_values(&["opened"]).inc();
    }

    /// Record an upstream stream being released.
    pub fn stream_released(&self) {
        self.upstream_streams_total
            .with_label_values(&["released"])
            .inc();
    }

    /// Record a refresh job run.
    pub fn record_refresh_job(&self, status: &str) {
        self.refresh_jobs_total.with_label_values(&[status]).inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
