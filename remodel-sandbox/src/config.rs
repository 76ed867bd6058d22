//! Sandbox engine configuration

use remodel_core::{ConfigError, RemodelError, RemodelResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the Trino cluster used as sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Coordinator root, e.g. `http://trino:8081`.
    pub base_url: String,
    /// Value of the `X-Trino-User` header.
    pub user: String,
    /// Catalog proposals and the replayed original schema live in.
    pub sandbox_catalog: String,
    /// Deadline for one HTTP round-trip to the coordinator.
    pub request_timeout: Duration,
    /// Pause before retrying a request the coordinator answered with 503.
    pub poll_interval: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://trino:8081".to_string(),
            user: "remodel".to_string(),
            sandbox_catalog: "iceberg".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SandboxConfig {
    /// Load from `REMODEL_TRINO_*` environment variables.
    ///
    /// Without `REMODEL_TRINO_URL`, the url is built from `TRINO_HOST` and
    /// `TRINO_PORT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("REMODEL_TRINO_URL").unwrap_or_else(|_| {
            match (std::env::var("TRINO_HOST"), std::env::var("TRINO_PORT")) {
                (Ok(host), Ok(port)) => format!("http://{}:{}", host, port),
                (Ok(host), Err(_)) => format!("http://{}:8081", host),
                _ => defaults.base_url.clone(),
            }
        });

        Self {
            base_url,
            user: std::env::var("REMODEL_TRINO_USER").unwrap_or(defaults.user),
            sandbox_catalog: std::env::var("REMODEL_TRINO_CATALOG")
                .unwrap_or(defaults.sandbox_catalog),
            request_timeout: std::env::var("REMODEL_TRINO_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            poll_interval: std::env::var("REMODEL_TRINO_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> RemodelResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RemodelError::Config(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: "must be an http(s) url".to_string(),
            }));
        }
        if self.user.trim().is_empty() {
            return Err(RemodelError::Config(ConfigError::MissingRequired {
                field: "user".to_string(),
            }));
        }
        if self.sandbox_catalog.trim().is_empty() {
            return Err(RemodelError::Config(ConfigError::MissingRequired {
                field: "sandbox_catalog".to_string(),
            }));
        }
        if self.request_timeout.is_zero() {
            return Err(RemodelError::Config(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: "0s".to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SandboxConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = SandboxConfig {
            base_url: "trino:8081".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SandboxConfig {
            sandbox_catalog: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RemodelError::Config(ConfigError::MissingRequired { .. }))
        ));

        let config = SandboxConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
