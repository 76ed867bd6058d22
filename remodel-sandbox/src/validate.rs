//! Statement validation against the sandbox

use crate::engine::StatementOutcome;
use crate::session::SandboxSession;
use remodel_core::{
    MigrationStatement, RefinementArtifact, RemodelResult, TableDefinition, ValidationFailure,
};

/// Run every statement of `artifact` and collect all failures.
///
/// Order is tables, then migrations, then queries. A rejected statement
/// never stops the batch. An empty result means the artifact validated.
/// Failures carry the statement as written, before namespace translation.
pub async fn validate(
    session: &SandboxSession,
    artifact: &RefinementArtifact,
) -> RemodelResult<Vec<ValidationFailure>> {
    let mut statements: Vec<&str> = Vec::with_capacity(artifact.statement_count());
    statements.extend(artifact.tables.iter().map(TableDefinition::as_str));
    statements.extend(artifact.migrations.iter().map(MigrationStatement::as_str));
    statements.extend(artifact.queries.iter().map(|q| q.text.as_str()));

    let mut failures = Vec::new();
    for statement in statements {
        if let Some(failure) = check(session, statement).await? {
            failures.push(failure);
        }
    }

    tracing::debug!(
        statements = artifact.statement_count(),
        failures = failures.len(),
        "artifact validated"
    );
    Ok(failures)
}

/// Run `statements` in order and stop at the first one the engine rejects.
pub async fn first_failure<S>(
    session: &SandboxSession,
    statements: &[S],
) -> RemodelResult<Option<ValidationFailure>>
where
    S: AsRef<str> + Sync,
{
    for statement in statements {
        if let Some(failure) = check(session, statement.as_ref()).await? {
            return Ok(Some(failure));
        }
    }
    Ok(None)
}

/// Run a single statement.
pub async fn check(
    session: &SandboxSession,
    statement: &str,
) -> RemodelResult<Option<ValidationFailure>> {
    match session.execute(statement).await? {
        StatementOutcome::Success => Ok(None),
        StatementOutcome::Failed { message } => {
            tracing::warn!(statement = %statement, error = %message, "statement rejected by sandbox");
            Ok(Some(ValidationFailure::new(statement, message)))
        }
    }
}
