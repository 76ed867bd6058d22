//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! Postgres-backed [`TaskStore`]. Every task lives in `tasks`; its inputs in
//! `ddls`/`queries` and its output in the three `result_*` tables, each
//! row carrying its list position so reads return submission order.

use crate::error::{ApiError, ApiResult};
use crate::store::{StoreResult, TaskRecord, TaskResult, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use remodel_core::{
    new_task_id, MigrationStatement, RankedQuery, RawDdl, RawQuery, RefinementArtifact,
    StoreError, TableDefinition, TaskId, TaskPayload, TaskStatus,
};
use remodel_pipeline::RefinementOutcome;
use std::time::Duration;
use tokio_postgres::NoTls;

/// Idempotent schema bootstrap.
const INIT_SQL: &str = include_str!("../sql/remodel_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full connection url; takes precedence over the discrete fields.
    pub url: Option<String>,
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a free connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "remodel".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// `DATABASE_URL` wins over the `REMODEL_DB_*` fields when set.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            host: std::env::var("REMODEL_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("REMODEL_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("REMODEL_DB_NAME").unwrap_or_else(|_| "remodel".to_string()),
            user: std::env::var("REMODEL_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("REMODEL_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("REMODEL_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("REMODEL_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        match &self.url {
            Some(url) => cfg.url = Some(url.clone()),
            None => {
                cfg.host = Some(self.host.clone());
                cfg.port = Some(self.port);
                cfg.dbname = Some(self.dbname.clone());
                cfg.user = Some(self.user.clone());
                cfg.password = Some(self.password.clone());
            }
        }

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// POSTGRES TASK STORE
// ============================================================================

fn db_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Database {
        reason: err.to_string(),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

/// [`TaskStore`] over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: Pool,
}

impl PgTaskStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store with a new pool from the given configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create the task tables if they do not exist.
    pub async fn bootstrap(&self) -> StoreResult<()> {
        let conn = self.pool.get().await.map_err(db_error)?;
        conn.batch_execute(INIT_SQL).await.map_err(db_error)?;
        tracing::info!("Task tables ready");
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn status_of(
        conn: &deadpool_postgres::Client,
        task_id: TaskId,
    ) -> StoreResult<Option<TaskStatus>> {
        let row = conn
            .query_opt("SELECT status FROM public.tasks WHERE taskid = $1", &[&task_id])
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => {
                let status: String = row.get(0);
                status
                    .parse::<TaskStatus>()
                    .map(Some)
                    .map_err(|reason| StoreError::Serialization { reason })
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PgTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTaskStore")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create_task(&self, payload: &TaskPayload) -> StoreResult<TaskId> {
        let task_id = new_task_id();
        let mut conn = self.pool.get().await.map_err(db_error)?;
        let tx = conn.transaction().await.map_err(db_error)?;

        tx.execute(
            "INSERT INTO public.tasks (taskid, url, status) VALUES ($1, $2, $3)",
            &[&task_id, &payload.url, &TaskStatus::Running.as_db_str()],
        )
        .await
        .map_err(db_error)?;

        for (i, ddl) in payload.ddl.iter().enumerate() {
            tx.execute(
                "INSERT INTO public.ddls (taskid, position, statement) VALUES ($1, $2, $3)",
                &[&task_id, &position(i), &ddl.statement],
            )
            .await
            .map_err(db_error)?;
        }

        for (i, query) in payload.queries.iter().enumerate() {
            tx.execute(
                "INSERT INTO public.queries \
                 (taskid, position, queryid, query, runquantity, executiontime) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &task_id,
                    &position(i),
                    &query.queryid,
                    &query.query,
                    &to_i64(query.runquantity),
                    &to_i64(query.executiontime),
                ],
            )
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(task_id)
    }

    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>> {
        let conn = self.pool.get().await.map_err(db_error)?;
        let row = conn
            .query_opt(
                "SELECT status, error, created_at FROM public.tasks WHERE taskid = $1",
                &[&task_id],
            )
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.get(0);
        let created_at: DateTime<Utc> = row.get(2);
        Ok(Some(TaskRecord {
            task_id,
            status: status
                .parse()
                .map_err(|reason| StoreError::Serialization { reason })?,
            error: row.get(1),
            created_at,
        }))
    }

    async fn load_payload(&self, task_id: TaskId) -> StoreResult<TaskPayload> {
        let conn = self.pool.get().await.map_err(db_error)?;
        let url: String = conn
            .query_opt("SELECT url FROM public.tasks WHERE taskid = $1", &[&task_id])
            .await
            .map_err(db_error)?
            .map(|row| row.get(0))
            .ok_or_else(|| StoreError::NotFound {
                task_id: task_id.to_string(),
            })?;

        let ddl = conn
            .query(
                "SELECT statement FROM public.ddls WHERE taskid = $1 ORDER BY position",
                &[&task_id],
            )
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| RawDdl {
                statement: row.get(0),
            })
            .collect();

        let queries = conn
            .query(
                "SELECT queryid, query, runquantity, executiontime \
                 FROM public.queries WHERE taskid = $1 ORDER BY position",
                &[&task_id],
            )
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| RawQuery {
                queryid: row.get(0),
                query: row.get(1),
                runquantity: to_u64(row.get(2)),
                executiontime: to_u64(row.get(3)),
            })
            .collect();

        Ok(TaskPayload { url, ddl, queries })
    }

    async fn next_running(&self) -> StoreResult<Option<TaskId>> {
        let conn = self.pool.get().await.map_err(db_error)?;
        let row = conn
            .query_opt(
                "SELECT taskid FROM public.tasks WHERE status = 'RUNNING' \
                 ORDER BY created_at LIMIT 1",
                &[],
            )
            .await
            .map_err(db_error)?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn save_result(&self, task_id: TaskId, outcome: &RefinementOutcome) -> StoreResult<()> {
        let report = serde_json::to_value(&outcome.report).map_err(|e| {
            StoreError::Serialization {
                reason: e.to_string(),
            }
        })?;

        let mut conn = self.pool.get().await.map_err(db_error)?;
        let tx = conn.transaction().await.map_err(db_error)?;

        // A retried save replaces the earlier rows
        for table in ["result_ddls", "result_migrations", "result_queries"] {
            let sql = format!("DELETE FROM public.{} WHERE taskid = $1", table);
            tx.execute(sql.as_str(), &[&task_id])
                .await
                .map_err(db_error)?;
        }

        for (i, table) in outcome.artifact.tables.iter().enumerate() {
            tx.execute(
                "INSERT INTO public.result_ddls (taskid, position, statement) VALUES ($1, $2, $3)",
                &[&task_id, &position(i), &table.statement],
            )
            .await
            .map_err(db_error)?;
        }

        for (i, migration) in outcome.artifact.migrations.iter().enumerate() {
            tx.execute(
                "INSERT INTO public.result_migrations (taskid, position, statement) \
                 VALUES ($1, $2, $3)",
                &[&task_id, &position(i), &migration.statement],
            )
            .await
            .map_err(db_error)?;
        }

        for (i, query) in outcome.artifact.queries.iter().enumerate() {
            tx.execute(
                "INSERT INTO public.result_queries (taskid, position, queryid, query) \
                 VALUES ($1, $2, $3, $4)",
                &[&task_id, &position(i), &query.id, &query.text],
            )
            .await
            .map_err(db_error)?;
        }

        let updated = tx
            .execute(
                "UPDATE public.tasks SET status = $2, report = $3, error = NULL WHERE taskid = $1",
                &[&task_id, &TaskStatus::Done.as_db_str(), &report],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                task_id: task_id.to_string(),
            });
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn fail_task(&self, task_id: TaskId, reason: &str) -> StoreResult<()> {
        let conn = self.pool.get().await.map_err(db_error)?;
        let updated = conn
            .execute(
                "UPDATE public.tasks SET status = $2, error = $3 WHERE taskid = $1",
                &[&task_id, &TaskStatus::Failed.as_db_str(), &reason],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_result(&self, task_id: TaskId) -> StoreResult<Option<TaskResult>> {
        let conn = self.pool.get().await.map_err(db_error)?;
        match Self::status_of(&conn, task_id).await? {
            None => {
                return Err(StoreError::NotFound {
                    task_id: task_id.to_string(),
                })
            }
            Some(TaskStatus::Done) => {}
            Some(_) => return Ok(None),
        }

        let tables = conn
            .query(
                "SELECT statement FROM public.result_ddls WHERE taskid = $1 ORDER BY position",
                &[&task_id],
            )
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| TableDefinition::new(row.get::<_, String>(0)))
            .collect();

        let migrations = conn
            .query(
                "SELECT statement FROM public.result_migrations WHERE taskid = $1 ORDER BY position",
                &[&task_id],
            )
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| MigrationStatement::new(row.get::<_, String>(0)))
            .collect();

        let queries = conn
            .query(
                "SELECT queryid, query FROM public.result_queries WHERE taskid = $1 ORDER BY position",
                &[&task_id],
            )
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|row| RankedQuery::new(row.get::<_, String>(0), row.get::<_, String>(1), 0))
            .collect();

        let report = conn
            .query_one("SELECT report FROM public.tasks WHERE taskid = $1", &[&task_id])
            .await
            .map_err(db_error)?
            .get::<_, Option<serde_json::Value>>(0)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Serialization {
                reason: e.to_string(),
            })?;

        Ok(Some(TaskResult {
            artifact: RefinementArtifact::new(tables, migrations, queries),
            report,
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        let conn = self.pool.get().await.map_err(db_error)?;
        conn.query_one("SELECT 1", &[]).await.map_err(db_error)?;
        Ok(())
    }
}
