//! Execution engine contract

use async_trait::async_trait;
use remodel_core::RemodelResult;
use serde::{Deserialize, Serialize};

/// Result of running one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatementOutcome {
    Success,
    /// The engine rejected the statement.
    Failed { message: String },
}

impl StatementOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        StatementOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatementOutcome::Success)
    }
}

/// A SQL engine statements are validated against.
/// Implementations must be thread-safe (Send + Sync).
///
/// Each call runs exactly one statement; there are no multi-statement
/// transactions. `Err` means the engine itself could not be reached
/// (`SandboxError::Engine`), as opposed to the statement being rejected.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, sql: &str) -> RemodelResult<StatementOutcome>;

    /// Engine name used in logs.
    fn engine_name(&self) -> &str;
}

/// Trim whitespace and remove a single trailing `;`.
pub fn strip_trailing_semicolon(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').map(str::trim_end).unwrap_or(trimmed)
}
