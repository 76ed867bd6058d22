//! Tracing Subscriber Initialization
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter` driven by
//! `RUST_LOG` and either JSON or human-readable formatting.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "remodel_api=debug,remodel_pipeline=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Emit JSON lines instead of human-readable output
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "remodel-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_json: true,
        }
    }
}

impl TelemetryConfig {
    /// Load from `REMODEL_SERVICE_NAME`, `REMODEL_ENVIRONMENT` and
    /// `REMODEL_LOG_JSON`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("REMODEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: defaults.service_version,
            environment: std::env::var("REMODEL_ENVIRONMENT").unwrap_or(defaults.environment),
            log_json: std::env::var("REMODEL_LOG_JSON")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(defaults.log_json),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Call once at startup, before anything logs. A second call fails.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.log_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Telemetry initialized"
    );

    Ok(())
}
