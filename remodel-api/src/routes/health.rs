//! Health probes
//!
//! `/health/ping` and `/health/live` only prove the process answers.
//! `/health/ready` round-trips the task store.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::state::AppState;
use crate::store::TaskStore;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthDetails {
    pub task_store: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
)]
pub async fn liveness() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        message: Some(format!("remodel-api {}", env!("CARGO_PKG_VERSION"))),
        details: None,
    })
}

/// GET /health/ready - Task store round trip
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse),
    ),
)]
pub async fn readiness(
    State(store): State<Arc<dyn TaskStore>>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let task_store = probe_store(store.as_ref()).await;
    let status = task_store.status;
    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => {
            tracing::warn!(error = ?task_store.error, "Readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            task_store,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    };
    (status_code, Json(response))
}

async fn probe_store(store: &dyn TaskStore) -> ComponentHealth {
    let started = Instant::now();
    match store.health_check().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::InMemoryTaskStore;

    #[tokio::test]
    async fn test_probe_in_memory_store() {
        let component = probe_store(&InMemoryTaskStore::new()).await;
        assert_eq!(component.status, HealthStatus::Healthy);
        assert!(component.latency_ms.is_some());
        assert!(component.error.is_none());
    }

    #[test]
    fn test_unhealthy_component_omits_latency() {
        let component = ComponentHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some("Database error: connection refused".to_string()),
        };

        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert!(json.get("latency_ms").is_none());
    }
}
