//! In-memory execution engine
//!
//! Accepts every statement unless a failure rule matches it. Each executed
//! statement is recorded so tests can assert on order and translation.

use crate::engine::{strip_trailing_semicolon, ExecutionEngine, StatementOutcome};
use async_trait::async_trait;
use remodel_core::{RemodelResult, SandboxError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    message: String,
    /// Remaining matches that fail; `None` fails forever.
    remaining: Option<u32>,
}

/// Engine that records statements and fails the ones matching a rule.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    executed: Mutex<Vec<String>>,
    rules: Mutex<Vec<FailureRule>>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `needle` with `message`.
    pub fn fail_when(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_rule(needle.into(), message.into(), None);
        self
    }

    /// Fail the next `times` statements containing `needle`, then accept them.
    pub fn fail_times(
        self,
        needle: impl Into<String>,
        message: impl Into<String>,
        times: u32,
    ) -> Self {
        self.push_rule(needle.into(), message.into(), Some(times));
        self
    }

    /// Delay every statement by `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = Some(latency);
        }
        self
    }

    /// Make every call fail as if the engine could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Statements executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    pub fn statement_count(&self) -> usize {
        self.executed.lock().map(|executed| executed.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut executed) = self.executed.lock() {
            executed.clear();
        }
    }

    fn push_rule(&self, needle: String, message: String, remaining: Option<u32>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(FailureRule {
                needle,
                message,
                remaining,
            });
        }
    }

    fn match_rule(&self, statement: &str) -> Option<String> {
        let mut rules = self.rules.lock().ok()?;
        for rule in rules.iter_mut() {
            if !statement.contains(&rule.needle) {
                continue;
            }
            match rule.remaining {
                None => return Some(rule.message.clone()),
                Some(0) => continue,
                Some(ref mut n) => {
                    *n -= 1;
                    return Some(rule.message.clone());
                }
            }
        }
        None
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn execute(&self, sql: &str) -> RemodelResult<StatementOutcome> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SandboxError::Engine {
                reason: "recording engine marked unavailable".to_string(),
            }
            .into());
        }

        let latency = self.latency.lock().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let statement = strip_trailing_semicolon(sql).to_string();
        let outcome = match self.match_rule(&statement) {
            Some(message) => StatementOutcome::failed(message),
            None => StatementOutcome::Success,
        };
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(statement);
        }
        Ok(outcome)
    }

    fn engine_name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remodel_core::RemodelError;

    #[tokio::test]
    async fn test_records_in_order() {
        let engine = RecordingEngine::new();
        engine.execute("SELECT 1;").await.unwrap();
        engine.execute("SELECT 2").await.unwrap();
        assert_eq!(engine.statements(), vec!["SELECT 1", "SELECT 2"]);

        engine.clear();
        assert_eq!(engine.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_rules() {
        let engine = RecordingEngine::new()
            .fail_when("bad_table", "Table not found")
            .fail_times("flaky", "transient", 1);

        assert_eq!(
            engine.execute("SELECT * FROM bad_table").await.unwrap(),
            StatementOutcome::failed("Table not found")
        );
        assert!(!engine.execute("SELECT flaky").await.unwrap().is_success());
        assert!(engine.execute("SELECT flaky").await.unwrap().is_success());
        assert!(!engine.execute("SELECT bad_table").await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unavailable_is_engine_error() {
        let engine = RecordingEngine::new();
        engine.set_unavailable(true);
        assert!(matches!(
            engine.execute("SELECT 1").await,
            Err(RemodelError::Sandbox(SandboxError::Engine { .. }))
        ));
        assert_eq!(engine.statement_count(), 0);

        engine.set_unavailable(false);
        assert!(engine.execute("SELECT 1").await.unwrap().is_success());
    }
}
