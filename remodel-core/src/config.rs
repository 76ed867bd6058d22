//! Refinement configuration

use crate::{ConfigError, RemodelError, RemodelResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default completion terminator token.
pub const DEFAULT_TERMINATOR: &str = "#END#";

/// Tuning knobs for one refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Completion calls allowed while refining schema and migrations.
    pub ddl_iteration_limit: u32,
    /// Completion calls allowed per workload query.
    pub query_iteration_limit: u32,
    /// Upper bound on new tables the model is asked to create.
    pub max_new_tables: u32,
    /// Pause after a blank completion before the conversation is reset.
    pub blank_response_backoff: Duration,
    /// Deadline for one completion call.
    pub completion_timeout: Duration,
    /// Deadline for one statement execution.
    pub statement_timeout: Duration,
    /// Token the model must end a complete schema response with.
    pub terminator: String,
    /// Prefix of the schema proposals are validated in.
    pub proposal_schema_prefix: String,
    /// Suffix the proposal schema with a per-task token.
    pub isolate_proposal_schema: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            ddl_iteration_limit: 5,
            query_iteration_limit: 3,
            max_new_tables: 10,
            blank_response_backoff: Duration::from_secs(5),
            completion_timeout: Duration::from_secs(300),
            statement_timeout: Duration::from_secs(120),
            terminator: DEFAULT_TERMINATOR.to_string(),
            proposal_schema_prefix: "remodel".to_string(),
            isolate_proposal_schema: true,
        }
    }
}

impl RefinementConfig {
    /// Load configuration from `REMODEL_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            ddl_iteration_limit: env_parse("REMODEL_DDL_ITERATION_LIMIT")
                .unwrap_or(defaults.ddl_iteration_limit),
            query_iteration_limit: env_parse("REMODEL_QUERY_ITERATION_LIMIT")
                .unwrap_or(defaults.query_iteration_limit),
            max_new_tables: env_parse("REMODEL_MAX_NEW_TABLES").unwrap_or(defaults.max_new_tables),
            blank_response_backoff: env_parse("REMODEL_BLANK_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.blank_response_backoff),
            completion_timeout: env_parse("REMODEL_COMPLETION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.completion_timeout),
            statement_timeout: env_parse("REMODEL_STATEMENT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.statement_timeout),
            terminator: std::env::var("REMODEL_TERMINATOR").unwrap_or(defaults.terminator),
            proposal_schema_prefix: std::env::var("REMODEL_PROPOSAL_SCHEMA_PREFIX")
                .unwrap_or(defaults.proposal_schema_prefix),
            isolate_proposal_schema: env_parse("REMODEL_ISOLATE_PROPOSAL_SCHEMA")
                .unwrap_or(defaults.isolate_proposal_schema),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns Ok(()) if valid, Err(RemodelError::Config) if invalid.
    pub fn validate(&self) -> RemodelResult<()> {
        if self.ddl_iteration_limit == 0 {
            return Err(invalid("ddl_iteration_limit", "0", "must be at least 1"));
        }
        if self.query_iteration_limit == 0 {
            return Err(invalid("query_iteration_limit", "0", "must be at least 1"));
        }
        if self.max_new_tables == 0 {
            return Err(invalid("max_new_tables", "0", "must be at least 1"));
        }
        if self.completion_timeout.is_zero() {
            return Err(invalid("completion_timeout", "0s", "must be positive"));
        }
        if self.statement_timeout.is_zero() {
            return Err(invalid("statement_timeout", "0s", "must be positive"));
        }
        if self.terminator.trim().is_empty() {
            return Err(invalid(
                "terminator",
                &self.terminator,
                "must contain a non-whitespace token",
            ));
        }
        if !is_identifier(&self.proposal_schema_prefix) {
            return Err(invalid(
                "proposal_schema_prefix",
                &self.proposal_schema_prefix,
                "must be a non-empty identifier of ASCII letters, digits or underscores",
            ));
        }
        Ok(())
    }

    /// Upper bound on completion calls for a run over `query_count` queries.
    pub fn completion_call_bound(&self, query_count: usize) -> u64 {
        let per_query = u64::from(self.query_iteration_limit);
        u64::from(self.ddl_iteration_limit)
            .saturating_add(per_query.saturating_mul(query_count as u64))
    }

    /// Name of the proposal schema for a task.
    ///
    /// With isolation enabled the name carries `task_token` so concurrent
    /// tasks never share a proposal schema.
    pub fn proposal_schema_name(&self, task_token: &str) -> String {
        if !self.isolate_proposal_schema {
            return self.proposal_schema_prefix.clone();
        }
        let token: String = task_token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(12)
            .collect::<String>()
            .to_ascii_lowercase();
        if token.is_empty() {
            self.proposal_schema_prefix.clone()
        } else {
            format!("{}_{}", self.proposal_schema_prefix, token)
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: &str, reason: &str) -> RemodelError {
    RemodelError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// TESTS
// ============================================================================
