//! Request and response bodies of the task API.

use remodel_core::{RawDdl, RawQuery, RefinementArtifact, TaskId, TaskPayload, TaskStatus};
use remodel_pipeline::RefinementReport;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// ============================================================================
// REQUESTS
// ============================================================================

/// One table definition of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DdlStatement {
    pub statement: String,
}

/// One workload query of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WorkloadQuery {
    pub queryid: String,
    pub query: String,
    /// How many times the query runs.
    pub runquantity: u64,
    /// Execution time estimate of one run.
    pub executiontime: u64,
}

/// Body of `POST /new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewTaskRequest {
    /// JDBC url of the cluster the workload runs on.
    pub url: String,
    pub ddl: Vec<DdlStatement>,
    pub queries: Vec<WorkloadQuery>,
}

impl From<NewTaskRequest> for TaskPayload {
    fn from(req: NewTaskRequest) -> Self {
        TaskPayload {
            url: req.url,
            ddl: req
                .ddl
                .into_iter()
                .map(|d| RawDdl {
                    statement: d.statement,
                })
                .collect(),
            queries: req
                .queries
                .into_iter()
                .map(|q| RawQuery {
                    queryid: q.queryid,
                    query: q.query,
                    runquantity: q.runquantity,
                    executiontime: q.executiontime,
                })
                .collect(),
        }
    }
}

/// Query string of the task lookup endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskIdParams {
    /// Task id returned by `POST /new`.
    pub task_id: String,
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewTaskResponse {
    #[schema(value_type = String)]
    pub taskid: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(value_type = String)]
    pub taskid: TaskId,
    /// `RUNNING`, `DONE` or `FAILED`.
    #[schema(value_type = String)]
    pub status: TaskStatus,
    /// Why the task failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A rewritten workload query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    pub queryid: String,
    pub query: String,
}

/// Body of `GET /getresult` for a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskResultResponse {
    pub ddl: Vec<DdlStatement>,
    pub migrations: Vec<DdlStatement>,
    pub queries: Vec<QueryResult>,
    /// Completeness record of the refinement run.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub report: Option<RefinementReport>,
}

impl TaskResultResponse {
    pub fn new(artifact: &RefinementArtifact, report: Option<RefinementReport>) -> Self {
        Self {
            ddl: artifact
                .tables
                .iter()
                .map(|t| DdlStatement {
                    statement: t.statement.clone(),
                })
                .collect(),
            migrations: artifact
                .migrations
                .iter()
                .map(|m| DdlStatement {
                    statement: m.statement.clone(),
                })
                .collect(),
            queries: artifact
                .queries
                .iter()
                .map(|q| QueryResult {
                    queryid: q.id.clone(),
                    query: q.text.clone(),
                })
                .collect(),
            report,
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BannerResponse {
    pub message: String,
    pub version: String,
}
