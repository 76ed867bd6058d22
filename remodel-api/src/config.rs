//! API Configuration Module
//!
//! Listener address, CORS and request limits. Loaded from environment
//! variables with development defaults.

use crate::error::{ApiError, ApiResult};
use std::net::SocketAddr;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
    /// Largest accepted request body. Task payloads carry whole workloads.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `REMODEL_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `REMODEL_API_PORT`: Listen port (default: 8000)
    /// - `REMODEL_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `REMODEL_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `REMODEL_MAX_BODY_BYTES`: Request body limit (default: 16 MiB)
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("REMODEL_API_PORT").ok())
        {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        let cors_origins = std::env::var("REMODEL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind: std::env::var("REMODEL_API_BIND").unwrap_or(defaults.bind),
            port,
            cors_origins,
            cors_max_age_secs: std::env::var("REMODEL_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
            max_body_bytes: std::env::var("REMODEL_MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}
