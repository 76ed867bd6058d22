//! Refinement report
//!
//! Budget exhaustion is not an error, so the artifact alone cannot tell a
//! caller how much of the task succeeded. The report makes that explicit.

use remodel_core::RefinementArtifact;
use serde::{Deserialize, Serialize};

/// Completeness record of one refinement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// The committed tables and migrations all ran cleanly. False when the
    /// schema budget ran out and the last parsed proposal was kept.
    pub schema_validated: bool,
    /// Schema iterations spent, out of the configured limit.
    pub ddl_iterations_used: u32,
    /// Completion calls across both phases.
    pub completion_calls: u64,
    /// Conversation resets after blank responses.
    pub history_resets: u32,
    /// Statements the sandbox rejected across both phases.
    pub validation_failures: u32,
    pub queries_requested: u32,
    pub queries_rewritten: u32,
    /// Queries the model declared impossible to rewrite.
    pub impossible_query_ids: Vec<String>,
    /// Queries whose budget ran out without a valid rewrite.
    pub dropped_query_ids: Vec<String>,
}

impl RefinementReport {
    /// Every query got a validated rewrite on a validated schema.
    pub fn is_complete(&self) -> bool {
        self.schema_validated && self.queries_rewritten == self.queries_requested
    }

    /// Queries absent from the output, for whatever reason.
    pub fn missing_query_count(&self) -> usize {
        self.impossible_query_ids.len() + self.dropped_query_ids.len()
    }
}

/// Final result of a refinement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub artifact: RefinementArtifact,
    pub report: RefinementReport,
}
