//! Namespace translation between the caller's catalog and the sandbox.

use crate::NamespaceContext;

/// Rewrite `statement` so it targets the sandbox catalog.
///
/// Every occurrence of `"<source_catalog>."` becomes `"<sandbox_catalog>."`.
/// This is a literal text substitution, not a SQL parse: a source catalog
/// name that is a suffix of an unrelated identifier gets rewritten too.
/// Schema components are never touched.
pub fn rewrite(statement: &str, ctx: &NamespaceContext) -> String {
    if ctx.source_catalog.is_empty() || ctx.source_catalog == ctx.sandbox_catalog {
        return statement.to_string();
    }
    let from = format!("{}.", ctx.source_catalog);
    let to = format!("{}.", ctx.sandbox_catalog);
    statement.replace(&from, &to)
}
