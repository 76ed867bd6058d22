//! Remodel Pipeline - Refinement Loop
//!
//! Drives one task from raw payload to refined artifact:
//!
//! ```text
//! PREPARING ──► DDL_MIGRATION_REFINEMENT ──► QUERY_REFINEMENT ──► DONE
//!     │                   │                        │
//!     └───────────────────┴────────────────────────┴──────────► FAILED
//! ```
//!
//! Each step waits on the previous one: a completion call, then validation
//! of what it proposed, then feedback for the next call. There is no
//! parallelism inside one task.

pub mod assemble;
pub mod listener;
pub mod pipeline;
pub mod report;

pub use assemble::{assemble, CommittedSchema};
pub use listener::{CompletionOutcome, RefinementListener, ValidationStage};
pub use pipeline::RefinementPipeline;
pub use report::{RefinementOutcome, RefinementReport};

use serde::{Deserialize, Serialize};

/// States of the refinement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefinementPhase {
    Preparing,
    DdlMigrationRefinement,
    QueryRefinement,
    Done,
    Failed,
}

impl RefinementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefinementPhase::Preparing => "preparing",
            RefinementPhase::DdlMigrationRefinement => "ddl_migration_refinement",
            RefinementPhase::QueryRefinement => "query_refinement",
            RefinementPhase::Done => "done",
            RefinementPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RefinementPhase::Done | RefinementPhase::Failed)
    }
}

impl std::fmt::Display for RefinementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
