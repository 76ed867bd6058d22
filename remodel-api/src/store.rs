//! Task persistence
//!
//! The HTTP handlers and the refinement worker share one [`TaskStore`].
//! Postgres backs it in production ([`crate::db::PgTaskStore`]); the
//! in-memory store serves tests and single-process development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remodel_core::{new_task_id, RefinementArtifact, StoreError, TaskId, TaskPayload, TaskStatus};
use remodel_pipeline::{RefinementOutcome, RefinementReport};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Result type of store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Status line of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Output of a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub artifact: RefinementArtifact,
    /// Absent for rows written before reports were persisted.
    pub report: Option<RefinementReport>,
}

/// Storage for submitted tasks and their results.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task in `RUNNING` state and return its id.
    async fn create_task(&self, payload: &TaskPayload) -> StoreResult<TaskId>;

    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>>;

    /// Reassemble the payload a task was submitted with.
    async fn load_payload(&self, task_id: TaskId) -> StoreResult<TaskPayload>;

    /// Oldest task still in `RUNNING` state.
    async fn next_running(&self) -> StoreResult<Option<TaskId>>;

    /// Store the outcome and mark the task `DONE`.
    async fn save_result(&self, task_id: TaskId, outcome: &RefinementOutcome) -> StoreResult<()>;

    /// Mark the task `FAILED`.
    async fn fail_task(&self, task_id: TaskId, reason: &str) -> StoreResult<()>;

    /// Result of a `DONE` task; `None` for any other state.
    async fn get_result(&self, task_id: TaskId) -> StoreResult<Option<TaskResult>>;

    /// Cheap round-trip used by the readiness probe.
    async fn health_check(&self) -> StoreResult<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone)]
struct StoredTask {
    record: TaskRecord,
    payload: TaskPayload,
    result: Option<TaskResult>,
    /// Submission order, used to pick the oldest running task.
    sequence: u64,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, StoredTask>,
    next_sequence: u64,
}

/// Process-local task store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::Database {
            reason: "task store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::Database {
            reason: "task store lock poisoned".to_string(),
        })
    }
}

fn not_found(task_id: TaskId) -> StoreError {
    StoreError::NotFound {
        task_id: task_id.to_string(),
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, payload: &TaskPayload) -> StoreResult<TaskId> {
        let task_id = new_task_id();
        let mut inner = self.write()?;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.tasks.insert(
            task_id,
            StoredTask {
                record: TaskRecord {
                    task_id,
                    status: TaskStatus::Running,
                    error: None,
                    created_at: Utc::now(),
                },
                payload: payload.clone(),
                result: None,
                sequence,
            },
        );
        Ok(task_id)
    }

    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.read()?.tasks.get(&task_id).map(|t| t.record.clone()))
    }

    async fn load_payload(&self, task_id: TaskId) -> StoreResult<TaskPayload> {
        self.read()?
            .tasks
            .get(&task_id)
            .map(|t| t.payload.clone())
            .ok_or_else(|| not_found(task_id))
    }

    async fn next_running(&self) -> StoreResult<Option<TaskId>> {
        Ok(self
            .read()?
            .tasks
            .values()
            .filter(|t| t.record.status == TaskStatus::Running)
            .min_by_key(|t| t.sequence)
            .map(|t| t.record.task_id))
    }

    async fn save_result(&self, task_id: TaskId, outcome: &RefinementOutcome) -> StoreResult<()> {
        let mut inner = self.write()?;
        let task = inner.tasks.get_mut(&task_id).ok_or_else(|| not_found(task_id))?;
        task.result = Some(TaskResult {
            artifact: outcome.artifact.clone(),
            report: Some(outcome.report.clone()),
        });
        task.record.status = TaskStatus::Done;
        task.record.error = None;
        Ok(())
    }

    async fn fail_task(&self, task_id: TaskId, reason: &str) -> StoreResult<()> {
        let mut inner = self.write()?;
        let task = inner.tasks.get_mut(&task_id).ok_or_else(|| not_found(task_id))?;
        task.record.status = TaskStatus::Failed;
        task.record.error = Some(reason.to_string());
        Ok(())
    }

    async fn get_result(&self, task_id: TaskId) -> StoreResult<Option<TaskResult>> {
        let inner = self.read()?;
        let task = inner.tasks.get(&task_id).ok_or_else(|| not_found(task_id))?;
        if task.record.status != TaskStatus::Done {
            return Ok(None);
        }
        Ok(task.result.clone())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remodel_core::{RawDdl, TableDefinition};

    fn payload() -> TaskPayload {
        TaskPayload {
            url: "jdbc:trino://trino:8080".to_string(),
            ddl: vec![RawDdl {
                statement: "CREATE TABLE cat.src.orders (id INT)".to_string(),
            }],
            queries: vec![],
        }
    }

    fn outcome() -> RefinementOutcome {
        RefinementOutcome {
            artifact: RefinementArtifact::new(
                vec![TableDefinition::new("CREATE TABLE sandbox.r.t (x INT)")],
                vec![],
                vec![],
            ),
            report: RefinementReport {
                schema_validated: true,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_task_lifecycle() -> StoreResult<()> {
        let store = InMemoryTaskStore::new();
        let id = store.create_task(&payload()).await?;

        let record = store.get_task(id).await?.unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(store.next_running().await?, Some(id));
        assert_eq!(store.load_payload(id).await?, payload());
        assert!(store.get_result(id).await?.is_none());

        store.save_result(id, &outcome()).await?;
        assert_eq!(store.get_task(id).await?.unwrap().status, TaskStatus::Done);
        assert_eq!(store.next_running().await?, None);

        let result = store.get_result(id).await?.unwrap();
        assert_eq!(result.artifact.tables.len(), 1);
        assert!(result.report.unwrap().schema_validated);
        Ok(())
    }

    #[tokio::test]
    async fn test_next_running_is_oldest() -> StoreResult<()> {
        let store = InMemoryTaskStore::new();
        let first = store.create_task(&payload()).await?;
        let second = store.create_task(&payload()).await?;

        assert_eq!(store.next_running().await?, Some(first));
        store.fail_task(first, "bad input").await?;
        assert_eq!(store.next_running().await?, Some(second));

        let failed = store.get_task(first).await?.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("bad input"));
        assert!(store.get_result(first).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_task() -> StoreResult<()> {
        let store = InMemoryTaskStore::new();
        let id = new_task_id();
        assert!(store.get_task(id).await?.is_none());
        assert!(matches!(
            store.load_payload(id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_result(id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.fail_task(id, "x").await,
            Err(StoreError::NotFound { .. })
        ));
        Ok(())
    }
}
