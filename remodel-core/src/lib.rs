//! Remodel Core - Data Model
//!
//! Plain data structures shared by every other crate: the statements a
//! proposal is made of, ranked workload queries, the refinement artifact,
//! validation failures and the namespace context used for sandboxing.
//! Behavior here is limited to textual rewriting and input normalization.

pub mod config;
pub mod error;
pub mod namespace;
pub mod normalize;
pub mod task;

pub use config::RefinementConfig;
pub use error::{
    ConfigError, InputError, LlmError, RefinementError, RemodelError, RemodelResult,
    SandboxError, StoreError,
};
pub use namespace::rewrite;
pub use normalize::{extract_source_namespace, normalize, rank_queries, NormalizedTask};
pub use task::{parse_jdbc_url, JdbcTarget, RawDdl, RawQuery, TaskPayload, TaskStatus};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Task identifier. Tasks are keyed by random UUIDs.
pub type TaskId = Uuid;

/// Generate a new random task id.
pub fn new_task_id() -> TaskId {
    Uuid::new_v4()
}

// ============================================================================
// STATEMENTS
// ============================================================================

/// A single schema-definition statement, kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDefinition {
    pub statement: String,
}

impl TableDefinition {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.statement
    }
}

impl AsRef<str> for TableDefinition {
    fn as_ref(&self) -> &str {
        &self.statement
    }
}

/// A single data-movement statement, kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationStatement {
    pub statement: String,
}

impl MigrationStatement {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.statement
    }
}

impl AsRef<str> for MigrationStatement {
    fn as_ref(&self) -> &str {
        &self.statement
    }
}

/// A workload query with its priority weight.
///
/// `weight` is run count multiplied by execution-time estimate; larger runs
/// first. Ids are expected to be unique within one task: result mapping is
/// keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedQuery {
    pub id: String,
    pub text: String,
    pub weight: u64,
}

impl RankedQuery {
    pub fn new(id: impl Into<String>, text: impl Into<String>, weight: u64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            weight,
        }
    }
}

/// Compute a query weight from its run count and execution-time estimate.
/// Saturates instead of overflowing.
pub fn query_weight(run_count: u64, exec_time_estimate: u64) -> u64 {
    run_count.saturating_mul(exec_time_estimate)
}

// ============================================================================
// REFINEMENT ARTIFACT
// ============================================================================

/// The current best candidate solution.
///
/// Only ever replaced as a whole; nothing mutates one of its lists in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementArtifact {
    pub tables: Vec<TableDefinition>,
    pub migrations: Vec<MigrationStatement>,
    pub queries: Vec<RankedQuery>,
}

impl RefinementArtifact {
    pub fn new(
        tables: Vec<TableDefinition>,
        migrations: Vec<MigrationStatement>,
        queries: Vec<RankedQuery>,
    ) -> Self {
        Self {
            tables,
            migrations,
            queries,
        }
    }

    /// True when the artifact carries no statement of any kind.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.migrations.is_empty() && self.queries.is_empty()
    }

    /// Total number of statements across all three lists.
    pub fn statement_count(&self) -> usize {
        self.tables.len() + self.migrations.len() + self.queries.len()
    }
}

// ============================================================================
// VALIDATION FAILURE
// ============================================================================

/// One failing statement and the engine's error message for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub statement: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// NAMESPACES
// ============================================================================

/// Catalog and schema the caller's original tables live in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceNamespace {
    pub catalog: String,
    pub schema: String,
}

/// Source and sandbox qualifiers for one task's refinement.
///
/// The original tables are replayed into `sandbox_catalog.source_schema`
/// (the replica namespace); proposals are created in
/// `sandbox_catalog.sandbox_schema` (the proposal namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceContext {
    pub source_catalog: String,
    pub source_schema: String,
    pub sandbox_catalog: String,
    pub sandbox_schema: String,
}

impl NamespaceContext {
    pub fn new(
        source: SourceNamespace,
        sandbox_catalog: impl Into<String>,
        sandbox_schema: impl Into<String>,
    ) -> Self {
        Self {
            source_catalog: source.catalog,
            source_schema: source.schema,
            sandbox_catalog: sandbox_catalog.into(),
            sandbox_schema: sandbox_schema.into(),
        }
    }

    /// Qualified name of the schema holding the replayed original tables.
    pub fn replica_schema(&self) -> String {
        format!("{}.{}", self.sandbox_catalog, self.source_schema)
    }

    /// Qualified name of the schema proposals are validated in.
    pub fn proposal_schema(&self) -> String {
        format!("{}.{}", self.sandbox_catalog, self.sandbox_schema)
    }

    /// Qualified name of the caller's original schema.
    pub fn source_qualified_schema(&self) -> String {
        format!("{}.{}", self.source_catalog, self.source_schema)
    }
}

// ============================================================================
// TESTS
// ============================================================================
