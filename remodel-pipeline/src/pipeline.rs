//! Refinement pipeline
//!
//! Phase A asks for a new schema plus migrations and feeds the first
//! rejected statement back until everything runs, or the schema budget is
//! spent. Phase B then asks for a rewrite of each original query, highest
//! weight first, against the committed schema.
//!
//! Every completion call costs one iteration of the current budget,
//! whatever its outcome. A run therefore makes at most
//! `ddl_iteration_limit + query_iteration_limit * queries` calls.

use crate::assemble::{assemble, CommittedSchema};
use crate::listener::{CompletionOutcome, ListenerChain, RefinementListener, ValidationStage};
use crate::report::{RefinementOutcome, RefinementReport};
use crate::RefinementPhase;
use remodel_core::{
    normalize, LlmError, NamespaceContext, NormalizedTask, RankedQuery, RefinementConfig,
    RefinementError, RemodelError, RemodelResult, SandboxError, TaskPayload,
};
use remodel_llm::{ChatMessage, CompletionProvider, Conversation};
use remodel_protocol::prompt::{
    empty_proposal_feedback, incomplete_response_feedback, query_request,
    query_rewrite_feedback, schema_request, system_message, validation_feedback,
};
use remodel_protocol::{
    classify_rewrite_response, classify_schema_response, parse_with_terminator, RewriteResponse,
    SchemaRequest, SchemaResponse,
};
use remodel_sandbox::{
    check, first_failure, ExecutionEngine, NamespaceRegistry, SandboxConfig, SandboxSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// PIPELINE
// ============================================================================

/// Refinement state machine for one task at a time.
///
/// Tasks may run concurrently on clones of one pipeline; the shared
/// [`NamespaceRegistry`] keeps their sandbox namespaces apart.
#[derive(Clone)]
pub struct RefinementPipeline {
    provider: Arc<dyn CompletionProvider>,
    engine: Arc<dyn ExecutionEngine>,
    registry: NamespaceRegistry,
    config: RefinementConfig,
    sandbox_catalog: String,
    shutdown: Option<watch::Receiver<bool>>,
    listeners: ListenerChain,
}

/// How the refinement of one query ended.
enum QueryResolution {
    Rewritten(RankedQuery),
    Impossible,
    Dropped,
}

/// Result of a completion call the loop can act on.
enum Reply {
    Text(String),
    /// The call failed; the iteration is spent.
    Failed,
}

impl RefinementPipeline {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        engine: Arc<dyn ExecutionEngine>,
        config: RefinementConfig,
        sandbox: &SandboxConfig,
    ) -> RemodelResult<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            engine,
            registry: NamespaceRegistry::new(),
            config,
            sandbox_catalog: sandbox.sandbox_catalog.clone(),
            shutdown: None,
            listeners: ListenerChain::default(),
        })
    }

    /// Share a namespace registry with other pipelines in the process.
    pub fn with_registry(mut self, registry: NamespaceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stop between iterations once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn RefinementListener>) -> Self {
        self.listeners.add(listener);
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Refine one task.
    ///
    /// `task_token` names the task in logs and suffixes its proposal schema.
    /// Input errors, sandbox preparation failures, an unreachable engine and
    /// cancellation end the run with `Err`; everything else yields an
    /// outcome whose report tells how complete it is.
    pub async fn run(
        &self,
        task_token: &str,
        payload: &TaskPayload,
    ) -> RemodelResult<RefinementOutcome> {
        let result = self.run_phases(task_token, payload).await;
        match &result {
            Ok(outcome) => {
                self.enter(task_token, RefinementPhase::Done);
                tracing::info!(
                    task = %task_token,
                    schema_validated = outcome.report.schema_validated,
                    completion_calls = outcome.report.completion_calls,
                    queries_rewritten = outcome.report.queries_rewritten,
                    queries_requested = outcome.report.queries_requested,
                    "refinement finished"
                );
            }
            Err(e) => {
                self.enter(task_token, RefinementPhase::Failed);
                tracing::error!(task = %task_token, error = %e, "refinement failed");
            }
        }
        result
    }

    async fn run_phases(
        &self,
        task_token: &str,
        payload: &TaskPayload,
    ) -> RemodelResult<RefinementOutcome> {
        self.enter(task_token, RefinementPhase::Preparing);
        payload.validate()?;
        let task = normalize(payload)?;
        let ctx = self.namespace_context(task_token, &task);

        let session = SandboxSession::open(
            Arc::clone(&self.engine),
            &self.registry,
            ctx,
            self.config.statement_timeout,
        )?;
        session.prepare(&task.tables).await?;

        let mut report = RefinementReport {
            queries_requested: task.queries.len() as u32,
            ..Default::default()
        };

        self.enter(task_token, RefinementPhase::DdlMigrationRefinement);
        let schema = self
            .refine_schema(task_token, &session, &task, &mut report)
            .await?;
        report.schema_validated = schema.validated;

        self.enter(task_token, RefinementPhase::QueryRefinement);
        let mut rewritten = Vec::new();
        for query in &task.queries {
            match self
                .refine_query(task_token, &session, &schema, query, &mut report)
                .await?
            {
                QueryResolution::Rewritten(q) => rewritten.push(q),
                QueryResolution::Impossible => report.impossible_query_ids.push(query.id.clone()),
                QueryResolution::Dropped => report.dropped_query_ids.push(query.id.clone()),
            }
        }
        report.queries_rewritten = rewritten.len() as u32;

        Ok(RefinementOutcome {
            artifact: assemble(&schema, rewritten),
            report,
        })
    }

    fn namespace_context(&self, task_token: &str, task: &NormalizedTask) -> NamespaceContext {
        NamespaceContext::new(
            task.source.clone(),
            self.sandbox_catalog.clone(),
            self.config.proposal_schema_name(task_token),
        )
    }

    // ========================================================================
    // PHASE A: SCHEMA AND MIGRATIONS
    // ========================================================================

    async fn refine_schema(
        &self,
        task_token: &str,
        session: &SandboxSession,
        task: &NormalizedTask,
        report: &mut RefinementReport,
    ) -> RemodelResult<CommittedSchema> {
        const PHASE: RefinementPhase = RefinementPhase::DdlMigrationRefinement;
        let ctx = session.context();
        let terminator = self.config.terminator.as_str();

        let request = schema_request(&SchemaRequest {
            sandbox_catalog: &ctx.sandbox_catalog,
            proposal_schema: &ctx.sandbox_schema,
            source_catalog: &ctx.source_catalog,
            source_schema: &ctx.source_schema,
            max_tables: self.config.max_new_tables,
            terminator,
            tables: &task.tables,
            queries: &task.queries,
        });
        let mut conversation = Conversation::new(vec![
            ChatMessage::system(system_message()),
            ChatMessage::user(request),
        ]);

        let limit = self.config.ddl_iteration_limit;
        let mut latest: Option<CommittedSchema> = None;

        for iteration in 1..=limit {
            self.check_cancelled()?;
            report.ddl_iterations_used = iteration;
            tracing::debug!(task = %task_token, phase = %PHASE, iteration, "schema iteration started");

            let reply = match self.complete(task_token, PHASE, &conversation, report).await? {
                Reply::Text(reply) => reply,
                Reply::Failed => continue,
            };

            match classify_schema_response(&reply, terminator) {
                SchemaResponse::Blank => {
                    self.backoff_and_reset(task_token, PHASE, &mut conversation, report)
                        .await;
                    continue;
                }
                SchemaResponse::Unterminated => {
                    tracing::warn!(task = %task_token, iteration, "schema response missing terminator");
                    self.listeners.completion(PHASE, CompletionOutcome::Unterminated);
                    conversation.push_exchange(reply, incomplete_response_feedback(terminator));
                    continue;
                }
                SchemaResponse::Complete(_) => {}
            }

            let proposal = parse_with_terminator(&reply, terminator);
            if proposal.tables.is_empty() {
                tracing::warn!(task = %task_token, iteration, "schema response has no table definitions");
                self.listeners.completion(PHASE, CompletionOutcome::Empty);
                conversation.push_exchange(reply, empty_proposal_feedback(terminator));
                continue;
            }
            if proposal.tables.len() > self.config.max_new_tables as usize {
                tracing::warn!(
                    task = %task_token,
                    tables = proposal.tables.len(),
                    max_tables = self.config.max_new_tables,
                    "proposal exceeds requested table count"
                );
            }

            let schema = CommittedSchema {
                tables: proposal.tables,
                migrations: proposal.migrations,
                validated: false,
            };

            match session.reset_proposal_namespace().await {
                Ok(()) => {}
                Err(RemodelError::Sandbox(e @ SandboxError::ProposalReset { .. })) => {
                    tracing::warn!(
                        task = %task_token,
                        iteration,
                        error = %e,
                        "proposal namespace reset failed; retrying next iteration"
                    );
                    latest = Some(schema);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let rejected = match first_failure(session, &schema.tables).await? {
                Some(failure) => Some((ValidationStage::Table, failure)),
                None => first_failure(session, &schema.migrations)
                    .await?
                    .map(|failure| (ValidationStage::Migration, failure)),
            };

            match rejected {
                Some((stage, failure)) => {
                    tracing::warn!(
                        task = %task_token,
                        iteration,
                        stage = stage.as_str(),
                        statement = %failure.statement,
                        error = %failure.message,
                        "proposal rejected by sandbox"
                    );
                    report.validation_failures += 1;
                    self.listeners.validation_failure(stage);
                    self.listeners.completion(PHASE, CompletionOutcome::Rejected);
                    conversation.push_exchange(reply, validation_feedback(&failure));
                    latest = Some(schema);
                }
                None => {
                    tracing::info!(
                        task = %task_token,
                        iteration,
                        tables = schema.tables.len(),
                        migrations = schema.migrations.len(),
                        "schema proposal validated"
                    );
                    self.listeners.completion(PHASE, CompletionOutcome::Accepted);
                    return Ok(CommittedSchema {
                        validated: true,
                        ..schema
                    });
                }
            }
        }

        match latest {
            Some(schema) => {
                tracing::warn!(
                    task = %task_token,
                    iterations = limit,
                    "schema budget exhausted; keeping last unvalidated proposal"
                );
                Ok(schema)
            }
            None => Err(RefinementError::NoProposal { iterations: limit }.into()),
        }
    }

    // ========================================================================
    // PHASE B: QUERY REWRITES
    // ========================================================================

    async fn refine_query(
        &self,
        task_token: &str,
        session: &SandboxSession,
        schema: &CommittedSchema,
        query: &RankedQuery,
        report: &mut RefinementReport,
    ) -> RemodelResult<QueryResolution> {
        const PHASE: RefinementPhase = RefinementPhase::QueryRefinement;
        let mut conversation = Conversation::new(vec![
            ChatMessage::system(system_message()),
            ChatMessage::user(query_request(&schema.tables, query)),
        ]);

        for attempt in 1..=self.config.query_iteration_limit {
            self.check_cancelled()?;
            tracing::debug!(
                task = %task_token,
                query_id = %query.id,
                weight = query.weight,
                attempt,
                "query rewrite attempt started"
            );

            let reply = match self.complete(task_token, PHASE, &conversation, report).await? {
                Reply::Text(reply) => reply,
                Reply::Failed => continue,
            };

            let candidate = match classify_rewrite_response(&reply) {
                RewriteResponse::Blank => {
                    self.backoff_and_reset(task_token, PHASE, &mut conversation, report)
                        .await;
                    continue;
                }
                RewriteResponse::Impossible => {
                    tracing::info!(task = %task_token, query_id = %query.id, "query declared impossible to rewrite");
                    self.listeners.completion(PHASE, CompletionOutcome::Impossible);
                    return Ok(QueryResolution::Impossible);
                }
                RewriteResponse::Candidate(sql) => sql,
            };

            match check(session, &candidate).await? {
                None => {
                    tracing::info!(task = %task_token, query_id = %query.id, attempt, "query rewrite validated");
                    self.listeners.completion(PHASE, CompletionOutcome::Accepted);
                    return Ok(QueryResolution::Rewritten(RankedQuery::new(
                        query.id.clone(),
                        candidate,
                        query.weight,
                    )));
                }
                Some(failure) => {
                    report.validation_failures += 1;
                    self.listeners.validation_failure(ValidationStage::Query);
                    self.listeners.completion(PHASE, CompletionOutcome::Rejected);
                    conversation.push_exchange(reply, query_rewrite_feedback(&failure));
                }
            }
        }

        tracing::warn!(
            task = %task_token,
            query_id = %query.id,
            attempts = self.config.query_iteration_limit,
            "query budget exhausted; dropping query"
        );
        Ok(QueryResolution::Dropped)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// One completion call under the configured deadline.
    ///
    /// Completion service errors spend the iteration and are reported as
    /// [`Reply::Failed`]; anything else propagates.
    async fn complete(
        &self,
        task_token: &str,
        phase: RefinementPhase,
        conversation: &Conversation,
        report: &mut RefinementReport,
    ) -> RemodelResult<Reply> {
        report.completion_calls += 1;
        let timeout = self.config.completion_timeout;

        let result =
            match tokio::time::timeout(timeout, self.provider.complete(conversation.messages()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    provider: self.provider.provider_name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into()),
            };

        match result {
            Ok(reply) => {
                tracing::debug!(
                    task = %task_token,
                    phase = %phase,
                    bytes = reply.len(),
                    "completion received"
                );
                Ok(Reply::Text(reply))
            }
            Err(RemodelError::Llm(e)) => {
                tracing::warn!(task = %task_token, phase = %phase, error = %e, "completion call failed");
                self.listeners.completion(phase, CompletionOutcome::Error);
                if let LlmError::RateLimited { retry_after_ms, .. } = e {
                    tokio::time::sleep(Duration::from_millis(retry_after_ms).min(timeout)).await;
                }
                Ok(Reply::Failed)
            }
            Err(e) => Err(e),
        }
    }

    async fn backoff_and_reset(
        &self,
        task_token: &str,
        phase: RefinementPhase,
        conversation: &mut Conversation,
        report: &mut RefinementReport,
    ) {
        tracing::warn!(
            task = %task_token,
            phase = %phase,
            backoff_ms = self.config.blank_response_backoff.as_millis() as u64,
            "blank completion; resetting conversation"
        );
        self.listeners.completion(phase, CompletionOutcome::Blank);
        tokio::time::sleep(self.config.blank_response_backoff).await;
        conversation.reset();
        report.history_resets += 1;
    }

    fn check_cancelled(&self) -> RemodelResult<()> {
        match &self.shutdown {
            Some(shutdown) if *shutdown.borrow() => Err(RefinementError::Cancelled.into()),
            _ => Ok(()),
        }
    }

    fn enter(&self, task_token: &str, phase: RefinementPhase) {
        tracing::info!(task = %task_token, phase = %phase, "refinement phase entered");
        self.listeners.phase(phase);
    }
}

impl std::fmt::Debug for RefinementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementPipeline")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("engine", &self.engine.engine_name())
            .field("sandbox_catalog", &self.sandbox_catalog)
            .field("config", &self.config)
            .finish()
    }
}
