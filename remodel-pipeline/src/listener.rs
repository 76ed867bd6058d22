//! Refinement event hooks
//!
//! The pipeline reports what happens to each completion call and each
//! rejected statement. The server turns these into metrics.

use crate::RefinementPhase;
use std::sync::Arc;

/// What came of one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionOutcome {
    /// The proposal or rewrite validated.
    Accepted,
    /// The proposal or rewrite was rejected by the sandbox.
    Rejected,
    Blank,
    Unterminated,
    /// Terminated, but without any table definition.
    Empty,
    Impossible,
    /// The completion service call itself failed.
    Error,
}

impl CompletionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionOutcome::Accepted => "accepted",
            CompletionOutcome::Rejected => "rejected",
            CompletionOutcome::Blank => "blank",
            CompletionOutcome::Unterminated => "unterminated",
            CompletionOutcome::Empty => "empty",
            CompletionOutcome::Impossible => "impossible",
            CompletionOutcome::Error => "error",
        }
    }
}

/// Kind of statement a validation failure was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    Table,
    Migration,
    Query,
}

impl ValidationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStage::Table => "table",
            ValidationStage::Migration => "migration",
            ValidationStage::Query => "query",
        }
    }
}

/// Observer of refinement progress. Every method defaults to a no-op.
pub trait RefinementListener: Send + Sync {
    fn on_phase(&self, _phase: RefinementPhase) {}

    fn on_completion(&self, _phase: RefinementPhase, _outcome: CompletionOutcome) {}

    fn on_validation_failure(&self, _stage: ValidationStage) {}
}

/// Fan-out to every registered listener.
#[derive(Clone, Default)]
pub(crate) struct ListenerChain {
    listeners: Vec<Arc<dyn RefinementListener>>,
}

impl ListenerChain {
    pub(crate) fn add(&mut self, listener: Arc<dyn RefinementListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn phase(&self, phase: RefinementPhase) {
        for listener in &self.listeners {
            listener.on_phase(phase);
        }
    }

    pub(crate) fn completion(&self, phase: RefinementPhase, outcome: CompletionOutcome) {
        for listener in &self.listeners {
            listener.on_completion(phase, outcome);
        }
    }

    pub(crate) fn validation_failure(&self, stage: ValidationStage) {
        for listener in &self.listeners {
            listener.on_validation_failure(stage);
        }
    }
}
