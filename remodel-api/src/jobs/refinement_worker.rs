//! Refinement Worker Background Task
//!
//! Polls the task store for `RUNNING` tasks and refines them one at a time:
//!
//! - A finished run stores its artifact and report and marks the task `DONE`
//! - Any error other than cancellation marks the task `FAILED` with the error text
//! - A cancelled run leaves the task `RUNNING` so the next start picks it up
//!
//! Once a poll finds work, the worker keeps draining the queue without
//! waiting for the next tick.

use crate::store::{StoreResult, TaskStore};
use crate::telemetry::METRICS;
use remodel_core::{parse_jdbc_url, RefinementError, RemodelError, TaskId};
use remodel_pipeline::RefinementPipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Default pause between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the refinement worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to look for new tasks while idle (default: 5 seconds)
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create WorkerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REMODEL_WORKER_POLL_INTERVAL_SECS`: Idle poll interval (default: 5)
    pub fn from_env() -> Self {
        let poll_interval = Duration::from_secs(
            std::env::var("REMODEL_WORKER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        Self { poll_interval }
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Counters of worker activity since startup.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub tasks_done: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_cancelled: AtomicU64,
    /// Store errors that interrupted a poll.
    pub store_errors: AtomicU64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            tasks_done: self.tasks_done.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub tasks_done: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub store_errors: u64,
}

/// How one task run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunOutcome {
    Done,
    Failed,
    Cancelled,
}

impl TaskRunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskRunOutcome::Done => "done",
            TaskRunOutcome::Failed => "failed",
            TaskRunOutcome::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Sequential consumer of the task queue.
pub struct RefinementWorker {
    store: Arc<dyn TaskStore>,
    pipeline: RefinementPipeline,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl RefinementWorker {
    pub fn new(store: Arc<dyn TaskStore>, pipeline: RefinementPipeline, config: WorkerConfig) -> Self {
        Self {
            store,
            pipeline,
            config,
            stats: Arc::new(WorkerStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown_rx` turns true or its sender is dropped.
    ///
    /// Give the pipeline a receiver of the same channel so a run in
    /// progress stops at its next iteration boundary.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Arc<WorkerStats> {
        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Refinement worker started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Refinement worker shutting down");
                        break;
                    }
                }

                _ = poll.tick() => {
                    if self.drain(&shutdown_rx).await {
                        break;
                    }
                }
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            tasks_done = snapshot.tasks_done,
            tasks_failed = snapshot.tasks_failed,
            tasks_cancelled = snapshot.tasks_cancelled,
            store_errors = snapshot.store_errors,
            "Refinement worker stopped"
        );

        self.stats
    }

    /// Process tasks until the queue is empty. Returns true when a run was
    /// cancelled and the worker should stop.
    async fn drain(&self, shutdown_rx: &watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown_rx.borrow() {
                return true;
            }
            match self.process_next().await {
                Ok(Some(TaskRunOutcome::Cancelled)) => return true,
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tracing::trace!("No running tasks");
                    return false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task store error, retrying on next poll");
                    self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
        }
    }

    /// Pick the oldest running task and refine it.
    ///
    /// Returns `Ok(None)` when no task is waiting.
    pub async fn process_next(&self) -> StoreResult<Option<TaskRunOutcome>> {
        let Some(task_id) = self.store.next_running().await? else {
            return Ok(None);
        };
        Ok(Some(self.process(task_id).await?))
    }

    async fn process(&self, task_id: TaskId) -> StoreResult<TaskRunOutcome> {
        tracing::info!(task_id = %task_id, "Picked up task");
        let payload = self.store.load_payload(task_id).await?;

        match parse_jdbc_url(&payload.url) {
            Ok(target) => tracing::debug!(
                task_id = %task_id,
                host = %target.host,
                port = ?target.port,
                "Task cluster"
            ),
            Err(e) => tracing::warn!(task_id = %task_id, error = %e, "Unparseable task url"),
        }

        let started = Instant::now();
        let outcome = match self.pipeline.run(&task_id.to_string(), &payload).await {
            Ok(result) => {
                tracing::info!(
                    task_id = %task_id,
                    complete = result.report.is_complete(),
                    tables = result.artifact.tables.len(),
                    migrations = result.artifact.migrations.len(),
                    queries = result.artifact.queries.len(),
                    "Refinement succeeded, saving result"
                );
                match self.store.save_result(task_id, &result).await {
                    Ok(()) => TaskRunOutcome::Done,
                    Err(e) => {
                        tracing::error!(task_id = %task_id, error = %e, "Failed to save result");
                        self.store
                            .fail_task(task_id, &format!("Failed to save result: {}", e))
                            .await?;
                        TaskRunOutcome::Failed
                    }
                }
            }
            Err(RemodelError::Refinement(RefinementError::Cancelled)) => {
                tracing::info!(task_id = %task_id, "Refinement cancelled, task stays queued");
                TaskRunOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Refinement failed");
                self.store.fail_task(task_id, &e.to_string()).await?;
                TaskRunOutcome::Failed
            }
        };

        let counter = match outcome {
            TaskRunOutcome::Done => &self.stats.tasks_done,
            TaskRunOutcome::Failed => &self.stats.tasks_failed,
            TaskRunOutcome::Cancelled => &self.stats.tasks_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_task_finished(outcome.as_str(), started.elapsed().as_secs_f64());
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for RefinementWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementWorker")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        assert_eq!(WorkerConfig::default().poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(TaskRunOutcome::Done.as_str(), "done");
        assert_eq!(TaskRunOutcome::Failed.as_str(), "failed");
        assert_eq!(TaskRunOutcome::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = WorkerStats::new();
        stats.tasks_done.fetch_add(2, Ordering::Relaxed);
        stats.store_errors.fetch_add(1, Ordering::Relaxed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tasks_done, 2);
        assert_eq!(snapshot.store_errors, 1);
        assert_eq!(snapshot.tasks_failed, 0);
    }
}
