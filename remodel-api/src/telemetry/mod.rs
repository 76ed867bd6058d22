//! Remodel Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the
//! HTTP layer and the refinement worker.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, MetricsListener, RemodelMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, TelemetryConfig, DEFAULT_LOG_FILTER};
