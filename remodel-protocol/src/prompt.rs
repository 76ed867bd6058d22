//! Prompt templates
//!
//! Natural-language requests sent to the completion service. The response
//! layout they ask for is fixed by [`crate::grammar`].

use crate::grammar::{
    DDLS_MARKER, IMPOSSIBLE, MIGRATIONS_MARKER, QUERIES_MARKER, QUERY_ID_LABEL, QUERY_LABEL,
};
use remodel_core::{RankedQuery, TableDefinition, ValidationFailure};
use std::fmt::Write;

const SYSTEM_MESSAGE: &str = "\
You are a senior data engineer with deep expertise in SQL, Trino, Apache Iceberg, \
big data and data modeling. You are highly experienced in optimizing Trino SQL over \
Iceberg tables and you quickly spot poor data modeling choices and fix them.

Users will show you the DDL of the tables in their database together with the SQL \
queries they run most often. Your job is to help them make those queries faster.";

/// Everything the schema request needs to know about one task.
#[derive(Debug, Clone, Copy)]
pub struct SchemaRequest<'a> {
    pub sandbox_catalog: &'a str,
    /// Unqualified name of the schema new tables must live in.
    pub proposal_schema: &'a str,
    pub source_catalog: &'a str,
    pub source_schema: &'a str,
    pub max_tables: u32,
    pub terminator: &'a str,
    pub tables: &'a [TableDefinition],
    pub queries: &'a [RankedQuery],
}

/// System instruction opening every conversation.
pub fn system_message() -> &'static str {
    SYSTEM_MESSAGE
}

/// Request for a new schema plus the migrations that fill it.
///
/// Only the `DDLS:` and `MIGRATIONS:` sections are asked for. Query rewrites
/// are requested one at a time once the schema is committed, so the model is
/// told to leave out the `QUERIES:` section.
pub fn schema_request(req: &SchemaRequest<'_>) -> String {
    let target = format!("{}.{}", req.sandbox_catalog, req.proposal_schema);
    let source = format!("{}.{}", req.source_catalog, req.source_schema);

    let mut out = String::new();
    let _ = write!(
        out,
        "I have a set of Trino queries that run too long. The cluster uses the Iceberg connector.
I want you to design a new schema with new tables so that every query below can be rewritten in a much more efficient way.

Write ONLY the DDL of the new tables and the SQL statements that migrate data into them.
Technical requirements:
    1. The schema {target} already exists. Create every new table inside it and do not emit CREATE SCHEMA.
    2. You may create at most {max} tables.
    3. Create only tables that the optimized queries will actually use.
    4. Always use fully qualified names: catalog_name.schema_name.table_name.
    5. Migrations read from the original tables in {source} and write into your new tables in {target}.
       For example: INSERT INTO {target}.t1 SELECT ... FROM {source}.table1
    6. Every statement must fit on a single line.

MAIN REQUIREMENT: it must be possible to rewrite ALL of my queries using ONLY your new tables.

Hint: Iceberg tables accept a 'partitioning' property, for example
CREATE TABLE {target}.example (c1 INTEGER, c2 DATE, c3 DOUBLE) WITH (format = 'PARQUET', partitioning = ARRAY['c2'], sorted_by = ARRAY['c1'])

Answer in exactly this format with no additional notes, and finish with {term} once you are done:
{ddls}
1. CREATE TABLE {target}.t1 (...);
2. CREATE TABLE {target}.t2 (...);
{migrations}
1. INSERT INTO {target}.t1 SELECT ...;
2. INSERT INTO {target}.t2 SELECT ...;
{term}

Do not include a {queries} section; the queries will be rewritten later, one at a time.

",
        target = target,
        source = source,
        max = req.max_tables,
        term = req.terminator,
        ddls = DDLS_MARKER,
        migrations = MIGRATIONS_MARKER,
        queries = QUERIES_MARKER,
    );

    out.push_str(&render_input(req.tables, req.queries));
    out
}

/// Request to rewrite one original query against the committed schema.
pub fn query_request(new_tables: &[TableDefinition], query: &RankedQuery) -> String {
    let mut tables = String::new();
    for table in new_tables {
        let _ = writeln!(tables, "{}", table.statement);
    }

    format!(
        "I am migrating my Trino queries to a new schema. The new schema and its tables already exist.
Rewrite the query below so that it runs as efficiently as possible on the new tables.

Technical requirements:
    1. The result must be identical to the result of the original query. THIS IS THE MOST IMPORTANT REQUIREMENT.
    2. Use fully qualified table names: catalog_name.schema_name.table_name.
    3. The statement must fit on a single line.

Reply with ONLY the SQL query, without notes or explanations.
If the query cannot be rewritten using only the new tables, reply with the single word {impossible}

New tables (the original schema had a different data model):
{tables}
Query to rewrite:
{query}
",
        impossible = IMPOSSIBLE,
        tables = tables,
        query = query.text,
    )
}

/// Feedback for one failing statement.
pub fn validation_feedback(failure: &ValidationFailure) -> String {
    format!(
        "I tried to run your statements and one of them failed.
Fix the error and send your answer again in the same format as before, including every statement, even those that worked.

Statement that failed:
{}

Error:
{}
",
        failure.statement, failure.message
    )
}

/// Feedback for a failed query rewrite.
pub fn query_rewrite_feedback(failure: &ValidationFailure) -> String {
    format!(
        "Running your query failed.
Fix it and reply with ONLY the corrected single-line SQL query, or {} if it cannot be done.

Query:
{}

Error:
{}
",
        IMPOSSIBLE, failure.statement, failure.message
    )
}

/// Nudge for a response that never reached the terminator.
pub fn incomplete_response_feedback(terminator: &str) -> String {
    format!(
        "Your answer was cut off before {term}. Send the complete answer again in the same format and end it with {term}.",
        term = terminator
    )
}

/// Feedback for a terminated response without any table definition.
pub fn empty_proposal_feedback(terminator: &str) -> String {
    format!(
        "Your answer did not contain any table definition under {ddls}. \
Send the complete answer in the requested format, with at least one CREATE TABLE statement under {ddls}, and end it with {term}.",
        ddls = DDLS_MARKER,
        term = terminator
    )
}

fn render_input(tables: &[TableDefinition], queries: &[RankedQuery]) -> String {
    let mut out = String::from("Here are my current DDLs:\n");
    for (i, table) in tables.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, table.statement);
    }
    out.push_str("\nHere are the queries I want to optimize, most important first:\n");
    for (i, query) in queries.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} {}\n{} {}",
            i + 1,
            QUERY_ID_LABEL,
            query.id,
            QUERY_LABEL,
            query.text
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(tables: &'a [TableDefinition], queries: &'a [RankedQuery]) -> SchemaRequest<'a> {
        SchemaRequest {
            sandbox_catalog: "sandbox",
            proposal_schema: "remodel_ab12",
            source_catalog: "cat",
            source_schema: "src",
            max_tables: 7,
            terminator: "#END#",
            tables,
            queries,
        }
    }

    #[test]
    fn test_schema_request_names_namespaces() {
        let tables = vec![TableDefinition::new("CREATE TABLE cat.src.orders (id INT)")];
        let queries = vec![RankedQuery::new("q1", "SELECT * FROM cat.src.orders", 50)];
        let text = schema_request(&request(&tables, &queries));

        assert!(text.contains("sandbox.remodel_ab12"));
        assert!(text.contains("cat.src"));
        assert!(text.contains("at most 7 tables"));
        assert!(text.contains("DDLS:"));
        assert!(text.contains("MIGRATIONS:"));
        assert!(text.contains("Do not include a QUERIES: section"));
        assert!(text.contains("#END#"));
        assert!(text.contains("1. CREATE TABLE cat.src.orders (id INT)"));
        assert!(text.contains("QUERY_ID: q1\nQUERY: SELECT * FROM cat.src.orders"));
    }

    #[test]
    fn test_query_request_mentions_impossible() {
        let tables = vec![TableDefinition::new("CREATE TABLE sandbox.r.t (x INT)")];
        let query = RankedQuery::new("q1", "SELECT 1", 1);
        let text = query_request(&tables, &query);
        assert!(text.contains("IMPOSSIBLE"));
        assert!(text.contains("CREATE TABLE sandbox.r.t (x INT)"));
        assert!(text.ends_with("SELECT 1\n"));
    }

    #[test]
    fn test_feedback_carries_statement_and_error() {
        let failure = ValidationFailure::new("CREATE TABLE x", "line 1:14: mismatched input");
        let text = validation_feedback(&failure);
        assert!(text.contains("CREATE TABLE x"));
        assert!(text.contains("mismatched input"));

        let rewrite = query_rewrite_feedback(&failure);
        assert!(rewrite.contains("IMPOSSIBLE"));
        assert!(rewrite.contains("mismatched input"));
    }

    #[test]
    fn test_protocol_nudges_name_terminator() {
        assert!(incomplete_response_feedback("#END#").contains("#END#"));
        let empty = empty_proposal_feedback("#STOP#");
        assert!(empty.contains("#STOP#"));
        assert!(empty.contains("DDLS:"));
        assert!(!system_message().is_empty());
    }
}
