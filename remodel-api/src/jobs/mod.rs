//! Background Jobs for the Remodel API
//!
//! - `refinement_worker`: Picks up `RUNNING` tasks and refines them
//!
//! # Usage
//!
//! The worker is spawned during server startup:
//!
//! ```ignore
//! use remodel_api::jobs::{RefinementWorker, WorkerConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let pipeline = pipeline.with_shutdown(shutdown_rx.clone());
//! let worker = RefinementWorker::new(Arc::clone(&store), pipeline, WorkerConfig::from_env());
//! let handle = tokio::spawn(worker.run(shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let stats = handle.await?;
//! ```

pub mod refinement_worker;

pub use refinement_worker::{
    RefinementWorker, TaskRunOutcome, WorkerConfig, WorkerStats, WorkerStatsSnapshot,
};
