//! Task REST API Routes
//!
//! Submission, status polling and result retrieval. Refinement itself runs
//! in the background worker; these handlers only touch the task store.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store::TaskStore,
    telemetry::METRICS,
    types::{NewTaskRequest, NewTaskResponse, StatusResponse, TaskIdParams, TaskResultResponse},
};
use remodel_core::{parse_jdbc_url, TaskPayload, TaskStatus};

fn parse_task_id(params: &TaskIdParams) -> ApiResult<Uuid> {
    if params.task_id.trim().is_empty() {
        return Err(ApiError::missing_field("task_id"));
    }
    Ok(Uuid::parse_str(params.task_id.trim())?)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /new - Submit a new optimization task
#[utoipa::path(
    post,
    path = "/new",
    tag = "Tasks",
    request_body = NewTaskRequest,
    responses(
        (status = 200, description = "Task accepted", body = NewTaskResponse),
        (status = 400, description = "Invalid task payload", body = ApiError),
    ),
)]
pub async fn create_task(
    State(store): State<Arc<dyn TaskStore>>,
    Json(req): Json<NewTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.url.trim().is_empty() {
        return Err(ApiError::missing_field("url"));
    }
    parse_jdbc_url(&req.url)?;

    let payload = TaskPayload::from(req);
    payload.validate()?;

    let taskid = store.create_task(&payload).await?;
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_task_submitted();
    }

    tracing::info!(
        task_id = %taskid,
        tables = payload.ddl.len(),
        queries = payload.queries.len(),
        "Created new task"
    );

    Ok(Json(NewTaskResponse { taskid }))
}

/// GET /status - Status of a task
#[utoipa::path(
    get,
    path = "/status",
    tag = "Tasks",
    params(TaskIdParams),
    responses(
        (status = 200, description = "Task status", body = StatusResponse),
        (status = 400, description = "Malformed task id", body = ApiError),
        (status = 404, description = "Task not found", body = ApiError),
    ),
)]
pub async fn get_status(
    State(store): State<Arc<dyn TaskStore>>,
    Query(params): Query<TaskIdParams>,
) -> ApiResult<Json<StatusResponse>> {
    let task_id = parse_task_id(&params)?;
    let record = store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;

    Ok(Json(StatusResponse {
        taskid: record.task_id,
        status: record.status,
        error: record.error,
    }))
}

/// GET /getresult - Refined schema, migrations and queries of a finished task
#[utoipa::path(
    get,
    path = "/getresult",
    tag = "Tasks",
    params(TaskIdParams),
    responses(
        (status = 200, description = "Task result", body = TaskResultResponse),
        (status = 400, description = "Malformed task id", body = ApiError),
        (status = 404, description = "Task not found", body = ApiError),
        (status = 409, description = "Task still running or failed", body = ApiError),
    ),
)]
pub async fn get_result(
    State(store): State<Arc<dyn TaskStore>>,
    Query(params): Query<TaskIdParams>,
) -> ApiResult<Json<TaskResultResponse>> {
    let task_id = parse_task_id(&params)?;
    let record = store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;

    match record.status {
        TaskStatus::Running => Err(ApiError::task_not_ready(task_id)),
        TaskStatus::Failed => Err(ApiError::task_failed(task_id, record.error.as_deref())),
        TaskStatus::Done => {
            let result = store
                .get_result(task_id)
                .await?
                .ok_or_else(|| ApiError::task_not_ready(task_id))?;
            Ok(Json(TaskResultResponse::new(&result.artifact, result.report)))
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/new", post(create_task))
        .route("/status", get(get_status))
        .route("/getresult", get(get_result))
}
