//! Remodel API Server Entry Point
//!
//! Bootstraps telemetry, the task store schema, the refinement pipeline and
//! its background worker, then starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use remodel_api::jobs::{RefinementWorker, WorkerConfig};
use remodel_api::telemetry::{init_tracer, MetricsListener, TelemetryConfig};
use remodel_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbConfig, PgTaskStore, TaskStore,
};
use remodel_core::RefinementConfig;
use remodel_llm::{ProviderConfig, ProviderRegistry};
use remodel_pipeline::RefinementPipeline;
use remodel_sandbox::{NamespaceRegistry, SandboxConfig, TrinoEngine};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let db_config = DbConfig::from_env();
    let pg_store = PgTaskStore::from_config(&db_config)?;
    pg_store.bootstrap().await?;
    let store: Arc<dyn TaskStore> = Arc::new(pg_store);

    let provider = ProviderRegistry::from_config(&ProviderConfig::from_env()?)?.completion()?;
    let sandbox_config = SandboxConfig::from_env();
    sandbox_config.validate()?;
    let engine = Arc::new(TrinoEngine::new(&sandbox_config)?);
    let refinement_config = RefinementConfig::from_env();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = RefinementPipeline::new(provider, engine, refinement_config, &sandbox_config)?
        .with_registry(NamespaceRegistry::new())
        .with_listener(Arc::new(MetricsListener))
        .with_shutdown(shutdown_rx.clone());

    let worker = RefinementWorker::new(Arc::clone(&store), pipeline, WorkerConfig::from_env());
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let api_config = ApiConfig::from_env()?;
    let app: Router = create_api_router(AppState::new(store), &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting Remodel API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    match worker_handle.await {
        Ok(stats) => tracing::info!(stats = ?stats.snapshot(), "Worker drained"),
        Err(e) => tracing::error!(error = %e, "Worker task panicked"),
    }

    Ok(())
}
