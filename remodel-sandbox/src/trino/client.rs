//! Trino statement client

use super::types::QueryResults;
use crate::engine::{strip_trailing_semicolon, ExecutionEngine, StatementOutcome};
use crate::SandboxConfig;
use async_trait::async_trait;
use remodel_core::{RemodelError, RemodelResult, SandboxError};
use reqwest::{Client, RequestBuilder, StatusCode};

const MAX_UNAVAILABLE_RETRIES: u32 = 10;
const USER_HEADER: &str = "X-Trino-User";

/// Execution engine backed by a Trino coordinator.
pub struct TrinoEngine {
    client: Client,
    base_url: String,
    user: String,
    catalog: String,
    poll_interval: std::time::Duration,
}

impl TrinoEngine {
    pub fn new(config: &SandboxConfig) -> RemodelResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| engine_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            catalog: config.sandbox_catalog.clone(),
            poll_interval: config.poll_interval,
        })
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(USER_HEADER, &self.user)
            .header("X-Trino-Catalog", &self.catalog)
            .header("X-Trino-Source", "remodel")
    }

    /// Send a request, retrying while the coordinator answers 503.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> RemodelResult<QueryResults> {
        let mut attempts = 0;
        loop {
            let response = self
                .with_headers(build())
                .send()
                .await
                .map_err(|e| engine_error(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if status == StatusCode::SERVICE_UNAVAILABLE && attempts < MAX_UNAVAILABLE_RETRIES {
                attempts += 1;
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(engine_error(format!(
                    "coordinator returned {}: {}",
                    status.as_u16(),
                    body.trim()
                )));
            }
            return response
                .json::<QueryResults>()
                .await
                .map_err(|e| engine_error(format!("Failed to parse response: {}", e)));
        }
    }
}

#[async_trait]
impl ExecutionEngine for TrinoEngine {
    async fn execute(&self, sql: &str) -> RemodelResult<StatementOutcome> {
        let statement = strip_trailing_semicolon(sql).to_string();
        let url = format!("{}/v1/statement", self.base_url);

        let mut page = self
            .send(|| self.client.post(&url).body(statement.clone()))
            .await?;
        let mut guard = CancelOnDrop {
            client: self.client.clone(),
            user: self.user.clone(),
            query_id: page.id.clone(),
            next_uri: None,
        };

        loop {
            if let Some(error) = page.error.take() {
                guard.disarm();
                tracing::debug!(query_id = %guard.query_id, error = %error.message, "trino statement failed");
                return Ok(StatementOutcome::failed(error.describe()));
            }
            match page.next_uri.take() {
                None => {
                    guard.disarm();
                    return Ok(StatementOutcome::Success);
                }
                Some(next) => {
                    guard.next_uri = Some(next.clone());
                    page = self.send(|| self.client.get(&next)).await?;
                }
            }
        }
    }

    fn engine_name(&self) -> &str {
        "trino"
    }
}

impl std::fmt::Debug for TrinoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrinoEngine")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Cancels the server-side query when `execute` is dropped mid-flight,
/// e.g. by a statement timeout.
///
/// Trino keeps running a query until its `nextUri` receives a `DELETE`.
struct CancelOnDrop {
    client: Client,
    user: String,
    query_id: String,
    next_uri: Option<String>,
}

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.next_uri = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(next_uri) = self.next_uri.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(query_id = %self.query_id, "no runtime to cancel abandoned trino query");
            return;
        };

        let request = self.client.delete(&next_uri).header(USER_HEADER, &self.user);
        let query_id = std::mem::take(&mut self.query_id);
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => tracing::info!(
                    query_id = %query_id,
                    status = response.status().as_u16(),
                    "abandoned trino query cancelled"
                ),
                Err(e) => tracing::warn!(
                    query_id = %query_id,
                    error = %e,
                    "failed to cancel abandoned trino query"
                ),
            }
        });
    }
}

fn engine_error(reason: String) -> RemodelError {
    RemodelError::Sandbox(SandboxError::Engine { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeTrino {
        base: Arc<Mutex<String>>,
        statements: Arc<Mutex<Vec<String>>>,
        polls: Arc<AtomicUsize>,
        unavailable: Arc<AtomicUsize>,
        cancelled: Arc<Mutex<Vec<String>>>,
    }

    async fn submit(State(fake): State<FakeTrino>, headers: HeaderMap, body: String) -> Json<Value> {
        assert_eq!(headers.get("x-trino-user").and_then(|v| v.to_str().ok()), Some("tester"));
        assert_eq!(headers.get("x-trino-catalog").and_then(|v| v.to_str().ok()), Some("sandbox"));
        fake.statements.lock().unwrap().push(body.clone());
        let base = fake.base.lock().unwrap().clone();
        if body.contains("missing") {
            return Json(json!({
                "id": "q1",
                "stats": {"state": "FAILED"},
                "error": {"message": "Table 'sandbox.s.missing' does not exist", "errorName": "TABLE_NOT_FOUND"}
            }));
        }
        if body.contains("slow") {
            return Json(json!({"id": "q4", "nextUri": format!("{}/v1/statement/queued/q4/slow", base), "stats": {"state": "QUEUED"}}));
        }
        if body.contains("late_failure") {
            return Json(json!({"id": "q2", "nextUri": format!("{}/v1/statement/queued/q2/fail", base), "stats": {"state": "QUEUED"}}));
        }
        Json(json!({"id": "q3", "nextUri": format!("{}/v1/statement/queued/q3/1", base), "stats": {"state": "QUEUED"}}))
    }

    async fn poll(
        State(fake): State<FakeTrino>,
        Path((id, token)): Path<(String, String)>,
    ) -> Result<Json<Value>, StatusCode> {
        if fake.unavailable.load(Ordering::SeqCst) > 0 {
            fake.unavailable.fetch_sub(1, Ordering::SeqCst);
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
        fake.polls.fetch_add(1, Ordering::SeqCst);
        let base = fake.base.lock().unwrap().clone();
        if token == "slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if token == "fail" {
            return Ok(Json(json!({
                "id": id,
                "stats": {"state": "FAILED"},
                "error": {"message": "Query exceeded maximum time limit"}
            })));
        }
        if token == "1" {
            return Ok(Json(json!({"id": id, "nextUri": format!("{}/v1/statement/executing/{}/2", base, id), "stats": {"state": "RUNNING"}})));
        }
        Ok(Json(json!({"id": id, "stats": {"state": "FINISHED"}})))
    }

    async fn cancel(
        State(fake): State<FakeTrino>,
        headers: HeaderMap,
        Path((id, _token)): Path<(String, String)>,
    ) -> StatusCode {
        assert_eq!(headers.get("x-trino-user").and_then(|v| v.to_str().ok()), Some("tester"));
        fake.cancelled.lock().unwrap().push(id);
        StatusCode::NO_CONTENT
    }

    async fn start(fake: FakeTrino) -> TrinoEngine {
        let router = Router::new()
            .route("/v1/statement", post(submit))
            .route("/v1/statement/queued/:id/:token", get(poll).delete(cancel))
            .route("/v1/statement/executing/:id/:token", get(poll))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        *fake.base.lock().unwrap() = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TrinoEngine::new(&SandboxConfig {
            base_url: base,
            user: "tester".to_string(),
            sandbox_catalog: "sandbox".to_string(),
            poll_interval: Duration::from_millis(5),
            ..SandboxConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_follows_next_uri_until_finished() {
        let fake = FakeTrino::default();
        let engine = start(fake.clone()).await;

        let outcome = engine.execute("CREATE TABLE sandbox.s.t (x INT);").await.unwrap();
        assert_eq!(outcome, StatementOutcome::Success);
        assert_eq!(fake.polls.load(Ordering::SeqCst), 2);
        assert_eq!(
            fake.statements.lock().unwrap().as_slice(),
            ["CREATE TABLE sandbox.s.t (x INT)".to_string()]
        );
        assert!(fake.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_statement_is_cancelled() {
        let fake = FakeTrino::default();
        let engine = start(fake.clone()).await;

        let result =
            tokio::time::timeout(Duration::from_millis(100), engine.execute("SELECT slow")).await;
        assert!(result.is_err());

        for _ in 0..100 {
            if !fake.cancelled.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(fake.cancelled.lock().unwrap().as_slice(), ["q4".to_string()]);
    }

    #[tokio::test]
    async fn test_error_on_first_page_is_statement_failure() {
        let engine = start(FakeTrino::default()).await;
        let outcome = engine.execute("SELECT * FROM sandbox.s.missing").await.unwrap();
        assert_eq!(
            outcome,
            StatementOutcome::failed("Table 'sandbox.s.missing' does not exist (TABLE_NOT_FOUND)")
        );
    }

    #[tokio::test]
    async fn test_error_on_later_page_is_statement_failure() {
        let engine = start(FakeTrino::default()).await;
        let outcome = engine.execute("SELECT late_failure").await.unwrap();
        assert_eq!(outcome, StatementOutcome::failed("Query exceeded maximum time limit"));
    }

    #[tokio::test]
    async fn test_retries_service_unavailable() {
        let fake = FakeTrino::default();
        fake.unavailable.store(2, Ordering::SeqCst);
        let engine = start(fake.clone()).await;
        assert!(engine.execute("SELECT 1").await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unreachable_coordinator_is_engine_error() {
        let engine = TrinoEngine::new(&SandboxConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout: Duration::from_secs(2),
            ..SandboxConfig::default()
        })
        .unwrap();
        assert!(matches!(
            engine.execute("SELECT 1").await,
            Err(RemodelError::Sandbox(SandboxError::Engine { .. }))
        ));
    }
}
