//! Remodel API - REST surface and background worker
//!
//! Accepts optimization tasks over HTTP, persists them in PostgreSQL and
//! refines them in a background worker driven by `remodel-pipeline`.
//! Clients poll `/status` and fetch the refined schema, migrations and
//! queries from `/getresult`.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use db::{DbConfig, PgTaskStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{RefinementWorker, WorkerConfig};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use store::{InMemoryTaskStore, TaskRecord, TaskResult, TaskStore};
pub use types::*;
