//! Wire contract between the refinement loop and the completion service.
//!
//! A schema response looks like:
//!
//! ```text
//! DDLS:
//! 1. CREATE TABLE sandbox.remodel.t1 (...);
//! MIGRATIONS:
//! 1. INSERT INTO sandbox.remodel.t1 SELECT ...;
//! QUERIES:
//! 1. QUERY_ID: q1
//! QUERY: SELECT ...;
//! #END#
//! ```
//!
//! Any change to the prompt templates in [`crate::prompt`] that alters this
//! layout has to be mirrored here and in [`crate::parser`].

use remodel_core::RefinementArtifact;

pub const DDLS_MARKER: &str = "DDLS:";
pub const MIGRATIONS_MARKER: &str = "MIGRATIONS:";
pub const QUERIES_MARKER: &str = "QUERIES:";

pub const QUERY_ID_LABEL: &str = "QUERY_ID:";
pub const QUERY_LABEL: &str = "QUERY:";

/// Separates query blocks inside the `QUERIES:` section.
pub const QUERY_BLOCK_SEPARATOR: char = ';';

/// Ordinal prefix separator on DDL and migration lines (`1. CREATE ...`).
pub const ORDINAL_SEPARATOR: char = '.';

/// Literal a per-query rewrite answers with when no rewrite exists.
pub const IMPOSSIBLE: &str = "IMPOSSIBLE";

pub use remodel_core::config::DEFAULT_TERMINATOR;

// ============================================================================
// RESPONSE CLASSIFICATION
// ============================================================================

/// Outcome of the framing checks on a schema response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaResponse<'a> {
    /// Empty or whitespace only.
    Blank,
    /// Non-blank but the terminator token is missing.
    Unterminated,
    /// Terminated response; the body excludes the terminator and anything after it.
    Complete(&'a str),
}

/// Check framing of a schema response.
pub fn classify_schema_response<'a>(raw: &'a str, terminator: &str) -> SchemaResponse<'a> {
    if raw.trim().is_empty() {
        return SchemaResponse::Blank;
    }
    match raw.find(terminator) {
        Some(pos) => SchemaResponse::Complete(&raw[..pos]),
        None => SchemaResponse::Unterminated,
    }
}

/// Outcome of a per-query rewrite response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteResponse {
    Blank,
    Impossible,
    /// Candidate statement, taken verbatim apart from surrounding whitespace.
    Candidate(String),
}

/// Classify a per-query rewrite response.
pub fn classify_rewrite_response(raw: &str) -> RewriteResponse {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        RewriteResponse::Blank
    } else if trimmed == IMPOSSIBLE {
        RewriteResponse::Impossible
    } else {
        RewriteResponse::Candidate(trimmed.to_string())
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Render an artifact in the response layout, terminator included.
///
/// Statements must be single-line and must not contain the query block
/// separator for the output to parse back to the same artifact.
pub fn render_response(artifact: &RefinementArtifact, terminator: &str) -> String {
    let mut out = String::new();

    out.push_str(DDLS_MARKER);
    out.push('\n');
    for (i, table) in artifact.tables.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, table.statement));
    }

    out.push_str(MIGRATIONS_MARKER);
    out.push('\n');
    for (i, migration) in artifact.migrations.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, migration.statement));
    }

    if !artifact.queries.is_empty() {
        out.push_str(QUERIES_MARKER);
        out.push('\n');
        for (i, query) in artifact.queries.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} {}\n{} {}{}\n",
                i + 1,
                QUERY_ID_LABEL,
                query.id,
                QUERY_LABEL,
                query.text,
                QUERY_BLOCK_SEPARATOR
            ));
        }
    }

    out.push_str(terminator);
    out
}
