//! OpenAPI Specification for the Remodel API
//!
//! Generated with utoipa from the route annotations and body types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{health, task};
use crate::types::{
    BannerResponse, DdlStatement, NewTaskRequest, NewTaskResponse, QueryResult, StatusResponse,
    TaskResultResponse, WorkloadQuery,
};

/// OpenAPI document for the Remodel API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Remodel API",
        description = "Schema and query refinement for analytical workloads",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8000", description = "Local Development")
    ),
    tags(
        (name = "Tasks", description = "Task submission, status and results"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        task::create_task,
        task::get_status,
        task::get_result,
        health::ping,
        health::liveness,
        health::readiness,
        crate::routes::banner,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        NewTaskRequest,
        DdlStatement,
        WorkloadQuery,
        NewTaskResponse,
        StatusResponse,
        QueryResult,
        TaskResultResponse,
        BannerResponse,
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
        ApiError,
        ErrorCode,
    ))
)]
pub struct ApiDoc;
