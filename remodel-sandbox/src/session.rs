//! Sandbox session
//!
//! A [`SandboxSession`] is the explicit resource scope of one task's
//! sandbox: it holds the namespace lease, translates every statement into
//! the sandbox catalog and bounds each statement by a timeout. Dropping the
//! session releases its namespaces.

use crate::engine::{ExecutionEngine, StatementOutcome};
use crate::lease::{NamespaceLease, NamespaceRegistry};
use remodel_core::{
    rewrite, NamespaceContext, RemodelResult, SandboxError, TableDefinition,
};
use std::sync::Arc;
use std::time::Duration;

/// One task's hold on the sandbox.
pub struct SandboxSession {
    engine: Arc<dyn ExecutionEngine>,
    ctx: NamespaceContext,
    statement_timeout: Duration,
    _lease: NamespaceLease,
}

impl SandboxSession {
    /// Lease the namespaces of `ctx` and open a session on `engine`.
    pub fn open(
        engine: Arc<dyn ExecutionEngine>,
        registry: &NamespaceRegistry,
        ctx: NamespaceContext,
        statement_timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let lease = registry.acquire(&ctx)?;
        tracing::debug!(
            engine = engine.engine_name(),
            replica = %ctx.replica_schema(),
            proposal = %ctx.proposal_schema(),
            "sandbox session opened"
        );
        Ok(Self {
            engine,
            ctx,
            statement_timeout,
            _lease: lease,
        })
    }

    pub fn context(&self) -> &NamespaceContext {
        &self.ctx
    }

    /// Rebuild the replica namespace from the caller's table definitions.
    ///
    /// Drops and recreates `sandbox_catalog.source_schema`, then replays each
    /// definition in order. The first rejected statement aborts with
    /// `SandboxError::Prepare`.
    pub async fn prepare(&self, tables: &[TableDefinition]) -> RemodelResult<()> {
        let replica = self.ctx.replica_schema();
        self.run_setup(Setup::Replica, &format!("DROP SCHEMA IF EXISTS {} CASCADE", replica))
            .await?;
        self.run_setup(Setup::Replica, &format!("CREATE SCHEMA {}", replica))
            .await?;

        for table in tables {
            self.run_setup(Setup::Replica, table.as_str()).await?;
        }

        tracing::info!(
            replica = %replica,
            tables = tables.len(),
            "sandbox replica prepared"
        );
        Ok(())
    }

    /// Drop and recreate the proposal namespace so no table from an earlier
    /// attempt survives.
    ///
    /// A rejected statement yields `SandboxError::ProposalReset`, which the
    /// caller may retry on its next iteration.
    pub async fn reset_proposal_namespace(&self) -> RemodelResult<()> {
        let proposal = self.ctx.proposal_schema();
        self.run_setup(Setup::Proposal, &format!("DROP SCHEMA IF EXISTS {} CASCADE", proposal))
            .await?;
        self.run_setup(Setup::Proposal, &format!("CREATE SCHEMA {}", proposal))
            .await
    }

    /// Translate `statement` into the sandbox and run it.
    ///
    /// A statement exceeding the timeout is reported as a failed outcome,
    /// not as an error, so the caller can feed it back like any rejection.
    /// The engine future is dropped at the deadline; engines cancel the
    /// server-side statement when that happens.
    pub async fn execute(&self, statement: &str) -> RemodelResult<StatementOutcome> {
        let translated = rewrite(statement, &self.ctx);
        match tokio::time::timeout(self.statement_timeout, self.engine.execute(&translated)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.statement_timeout.as_millis() as u64,
                    "sandbox statement timed out"
                );
                Ok(StatementOutcome::failed(format!(
                    "Statement timed out after {}ms",
                    self.statement_timeout.as_millis()
                )))
            }
        }
    }

    async fn run_setup(&self, setup: Setup, statement: &str) -> RemodelResult<()> {
        match self.execute(statement).await? {
            StatementOutcome::Success => Ok(()),
            StatementOutcome::Failed { message } => {
                tracing::error!(
                    statement = %statement,
                    error = %message,
                    namespace = setup.as_str(),
                    "sandbox setup failed"
                );
                Err(setup.error(statement.to_string(), message).into())
            }
        }
    }
}

/// Which namespace a setup statement belongs to.
#[derive(Debug, Clone, Copy)]
enum Setup {
    /// Replica of the caller's schema; a failure means the input is unusable.
    Replica,
    Proposal,
}

impl Setup {
    fn as_str(self) -> &'static str {
        match self {
            Setup::Replica => "replica",
            Setup::Proposal => "proposal",
        }
    }

    fn error(self, statement: String, message: String) -> SandboxError {
        match self {
            Setup::Replica => SandboxError::Prepare { statement, message },
            Setup::Proposal => SandboxError::ProposalReset { statement, message },
        }
    }
}

impl std::fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxSession")
            .field("engine", &self.engine.engine_name())
            .field("ctx", &self.ctx)
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}
