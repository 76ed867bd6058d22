//! Error types for Remodel operations

use thiserror::Error;

/// Task input errors. Raised before any refinement work starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Task input is empty: no {what} supplied")]
    EmptyInput { what: String },

    #[error("Could not extract catalog and schema from table definition: {statement}")]
    SchemaExtraction { statement: String },

    #[error("Invalid query {query_id}: {reason}")]
    InvalidQuery { query_id: String, reason: String },

    #[error("Invalid connection url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Sandbox and execution engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Sandbox preparation failed on statement `{statement}`: {message}")]
    Prepare { statement: String, message: String },

    #[error("Resetting the proposal namespace failed on statement `{statement}`: {message}")]
    ProposalReset { statement: String, message: String },

    #[error("Namespace {namespace} is already leased by another task")]
    NamespaceBusy { namespace: String },

    #[error("Execution engine unavailable: {reason}")]
    Engine { reason: String },
}

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Completion from {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

/// Task persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Task not found: {task_id}")]
    NotFound { task_id: String },

    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

/// Refinement loop errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefinementError {
    #[error("No usable proposal after {iterations} iterations")]
    NoProposal { iterations: u32 },

    #[error("Refinement cancelled")]
    Cancelled,
}

/// Master error type for all Remodel errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemodelError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Refinement error: {0}")]
    Refinement(#[from] RefinementError),
}

impl RemodelError {
    /// Whether this error ends the task without any retry.
    ///
    /// Only unusable input, a failed replica preparation and bad
    /// configuration are fatal. Completion service errors, sandbox outages,
    /// lease conflicts and store errors are transient, and cancellation or an
    /// exhausted budget are outcomes rather than faults.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RemodelError::Input(_)
                | RemodelError::Sandbox(SandboxError::Prepare { .. })
                | RemodelError::Config(_)
        )
    }
}

/// Result type alias for Remodel operations.
pub type RemodelResult<T> = Result<T, RemodelError>;

// =============================================================================
// TESTS
// =============================================================================
