//! Prometheus Metrics Definitions
//!
//! Defines all Remodel metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use remodel_pipeline::{CompletionOutcome, RefinementListener, RefinementPhase, ValidationStage};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Refinement run buckets (seconds). A run is dominated by completion calls.
const PIPELINE_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 2400.0, 3600.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<RemodelMetrics>> = Lazy::new(RemodelMetrics::new);

/// Container for all Remodel metrics.
#[derive(Clone)]
pub struct RemodelMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Tasks accepted by `POST /new`
    pub tasks_submitted_total: Counter,

    /// Tasks the worker finished - labels: outcome (done, failed, cancelled)
    pub tasks_finished_total: CounterVec,

    /// Completion calls - labels: phase, outcome
    pub completion_calls_total: CounterVec,

    /// Statements rejected by the sandbox - labels: stage
    pub validation_failures_total: CounterVec,

    /// Refinement run duration histogram - labels: outcome
    pub pipeline_duration_seconds: HistogramVec,
}

impl RemodelMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "remodel_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "remodel_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            tasks_submitted_total: register_counter!(
                "remodel_tasks_submitted_total",
                "Total number of submitted tasks"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register tasks_submitted_total: {}", e)))?,

            tasks_finished_total: register_counter_vec!(
                "remodel_tasks_finished_total",
                "Total number of tasks the worker finished",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register tasks_finished_total: {}", e)))?,

            completion_calls_total: register_counter_vec!(
                "remodel_completion_calls_total",
                "Total number of completion service calls",
                &["phase", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register completion_calls_total: {}", e)))?,

            validation_failures_total: register_counter_vec!(
                "remodel_validation_failures_total",
                "Total number of statements rejected by the sandbox",
                &["stage"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register validation_failures_total: {}", e)))?,

            pipeline_duration_seconds: register_histogram_vec!(
                "remodel_pipeline_duration_seconds",
                "Refinement run duration in seconds",
                &["outcome"],
                PIPELINE_DURATION_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register pipeline_duration_seconds: {}", e)))?,
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

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.inc();
    }

    /// Record the end of a refinement run.
    pub fn record_task_finished(&self, outcome: &str, duration_secs: f64) {
        self.tasks_finished_total.with_label_values(&[outcome]).inc();
        self.pipeline_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_completion(&self, phase: RefinementPhase, outcome: CompletionOutcome) {
        self.completion_calls_total
            .with_label_values(&[phase.as_str(), outcome.as_str()])
            .inc();
    }

    pub fn record_validation_failure(&self, stage: ValidationStage) {
        self.validation_failures_total
            .with_label_values(&[stage.as_str()])
            .inc();
    }
}

/// Feeds refinement events into [`METRICS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsListener;

impl RefinementListener for MetricsListener {
    fn on_completion(&self, phase: RefinementPhase, outcome: CompletionOutcome) {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_completion(phase, outcome);
        }
    }

    fn on_validation_failure(&self, stage: ValidationStage) {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_validation_failure(stage);
        }
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
    // Register the Remodel families before the first scrape
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registration failed");
    }

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
