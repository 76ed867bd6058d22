//! Remodel Test Utilities
//!
//! Centralized test infrastructure for the Remodel workspace:
//! - Proptest generators for statements, queries and payloads
//! - Fixtures for a small orders schema and canned completion responses
//! - Custom assertions for Remodel error classes

// Re-export test doubles from their source crates
pub use remodel_llm::mock::{ScriptedCompletionProvider, ScriptedReply};
pub use remodel_sandbox::RecordingEngine;

pub use remodel_core::{
    MigrationStatement, RankedQuery, RawDdl, RawQuery, RefinementArtifact, RefinementConfig,
    RemodelError, RemodelResult, TableDefinition, TaskPayload,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;

    /// Generate a lowercase SQL identifier.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Generate a single-line statement free of protocol markers and `;`.
    pub fn arb_statement() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("CREATE TABLE"),
                Just("INSERT INTO"),
                Just("SELECT * FROM")
            ],
            arb_identifier(),
            arb_identifier(),
            arb_identifier(),
        )
            .prop_map(|(verb, catalog, schema, table)| {
                format!("{} {}.{}.{} (x INT)", verb, catalog, schema, table)
            })
    }

    /// Generate a ranked query with a bounded weight.
    pub fn arb_ranked_query() -> impl Strategy<Value = RankedQuery> {
        ("q[0-9]{1,4}", arb_statement(), 0u64..10_000)
            .prop_map(|(id, text, weight)| RankedQuery::new(id, text, weight))
    }

    /// Generate up to `max` ranked queries with unique ids.
    pub fn arb_ranked_queries(max: usize) -> impl Strategy<Value = Vec<RankedQuery>> {
        prop::collection::vec((arb_statement(), 0u64..100), 0..=max).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, weight))| RankedQuery::new(format!("q{}", i), text, weight))
                .collect()
        })
    }

    /// Generate a raw workload query.
    pub fn arb_raw_query() -> impl Strategy<Value = RawQuery> {
        ("q[0-9]{1,4}", arb_statement(), 0u64..1_000, 0u64..1_000).prop_map(
            |(queryid, query, runquantity, executiontime)| RawQuery {
                queryid,
                query,
                runquantity,
                executiontime,
            },
        )
    }

    /// Generate an artifact whose statements render and parse cleanly.
    pub fn arb_artifact() -> impl Strategy<Value = RefinementArtifact> {
        (
            prop::collection::vec(arb_statement(), 0..5),
            prop::collection::vec(arb_statement(), 0..5),
            arb_ranked_queries(4),
        )
            .prop_map(|(tables, migrations, queries)| {
                RefinementArtifact::new(
                    tables.into_iter().map(TableDefinition::new).collect(),
                    migrations.into_iter().map(MigrationStatement::new).collect(),
                    queries
                        .into_iter()
                        .map(|q| RankedQuery::new(q.id, q.text, 0))
                        .collect(),
                )
            })
    }

    /// Generate a payload anchored on a fully qualified first DDL.
    pub fn arb_task_payload() -> impl Strategy<Value = TaskPayload> {
        (
            arb_identifier(),
            arb_identifier(),
            prop::collection::vec(arb_identifier(), 1..4),
            prop::collection::vec(arb_raw_query(), 0..6),
        )
            .prop_map(|(catalog, schema, tables, queries)| TaskPayload {
                url: "jdbc:trino://trino:8080".to_string(),
                ddl: tables
                    .into_iter()
                    .map(|t| RawDdl {
                        statement: format!("CREATE TABLE {}.{}.{} (id INT)", catalog, schema, t),
                    })
                    .collect(),
                queries,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.
    //!
    //! The source namespace is `cat.src`; tests run the sandbox in catalog
    //! `sandbox`, so the replica namespace is `sandbox.src`.

    use super::*;
    use remodel_sandbox::SandboxConfig;
    use std::time::Duration;

    pub const SOURCE_CATALOG: &str = "cat";
    pub const SOURCE_SCHEMA: &str = "src";
    pub const SANDBOX_CATALOG: &str = "sandbox";

    pub const ORDERS_DDL: &str =
        "CREATE TABLE cat.src.orders (id INT, customer VARCHAR, total DOUBLE)";
    pub const ORDERS_QUERY: &str =
        "SELECT customer, sum(total) FROM cat.src.orders GROUP BY customer";

    /// Raw query entry.
    pub fn raw_query(id: &str, text: &str, runquantity: u64, executiontime: u64) -> RawQuery {
        RawQuery {
            queryid: id.to_string(),
            query: text.to_string(),
            runquantity,
            executiontime,
        }
    }

    /// One orders table and one query of weight 50.
    pub fn payload() -> TaskPayload {
        TaskPayload {
            url: "jdbc:trino://trino:8080?user=remodel".to_string(),
            ddl: vec![RawDdl {
                statement: ORDERS_DDL.to_string(),
            }],
            queries: vec![raw_query("q1", ORDERS_QUERY, 10, 5)],
        }
    }

    /// The orders table with `queries` appended.
    pub fn payload_with_queries(queries: Vec<RawQuery>) -> TaskPayload {
        TaskPayload {
            queries,
            ..payload()
        }
    }

    /// Valid schema response creating one aggregate table in `proposal_schema`.
    pub fn schema_response(proposal_schema: &str) -> String {
        format!(
            "DDLS:\n\
             1. CREATE TABLE sandbox.{s}.orders_by_customer (customer VARCHAR, total DOUBLE);\n\
             MIGRATIONS:\n\
             1. INSERT INTO sandbox.{s}.orders_by_customer SELECT customer, sum(total) FROM cat.src.orders GROUP BY customer;\n\
             #END#",
            s = proposal_schema
        )
    }

    /// Table definitions of [`schema_response`], as parsed.
    pub fn schema_response_tables(proposal_schema: &str) -> Vec<TableDefinition> {
        vec![TableDefinition::new(format!(
            "CREATE TABLE sandbox.{}.orders_by_customer (customer VARCHAR, total DOUBLE);",
            proposal_schema
        ))]
    }

    /// Rewrite of [`ORDERS_QUERY`] against [`schema_response`].
    pub fn rewrite_response(proposal_schema: &str) -> String {
        format!(
            "SELECT customer, total FROM sandbox.{}.orders_by_customer",
            proposal_schema
        )
    }

    /// Response in the section layout for an arbitrary artifact.
    pub fn rendered_response(artifact: &RefinementArtifact) -> String {
        remodel_protocol::render_response(artifact, remodel_protocol::DEFAULT_TERMINATOR)
    }

    /// Refinement defaults with a near-zero blank backoff.
    pub fn fast_config() -> RefinementConfig {
        RefinementConfig {
            blank_response_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    pub fn sandbox_config() -> SandboxConfig {
        SandboxConfig {
            sandbox_catalog: SANDBOX_CATALOG.to_string(),
            ..Default::default()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion helpers for Remodel-specific validation.

    use super::*;
    use remodel_core::{InputError, RefinementError, SandboxError};

    /// Assert that a result is a fatal error.
    pub fn assert_fatal<T: std::fmt::Debug>(result: &RemodelResult<T>) {
        match result {
            Err(e) => assert!(e.is_fatal(), "Expected fatal error, got {:?}", e),
            Ok(v) => panic!("Expected fatal error, got Ok({:?})", v),
        }
    }

    /// Assert that a result is an input error.
    pub fn assert_input_error<T: std::fmt::Debug>(result: &RemodelResult<T>) {
        assert!(
            matches!(result, Err(RemodelError::Input(_))),
            "Expected InputError, got {:?}",
            result
        );
    }

    /// Assert that a result is a schema extraction failure.
    pub fn assert_schema_extraction<T: std::fmt::Debug>(result: &RemodelResult<T>) {
        assert!(
            matches!(
                result,
                Err(RemodelError::Input(InputError::SchemaExtraction { .. }))
            ),
            "Expected SchemaExtraction, got {:?}",
            result
        );
    }

    /// Assert that a result is a sandbox preparation failure.
    pub fn assert_prepare_failure<T: std::fmt::Debug>(result: &RemodelResult<T>) {
        assert!(
            matches!(result, Err(RemodelError::Sandbox(SandboxError::Prepare { .. }))),
            "Expected Prepare failure, got {:?}",
            result
        );
    }

    /// Assert that a result is `NoProposal`.
    pub fn assert_no_proposal<T: std::fmt::Debug>(result: &RemodelResult<T>) {
        assert!(
            matches!(
                result,
                Err(RemodelError::Refinement(RefinementError::NoProposal { .. }))
            ),
            "Expected NoProposal, got {:?}",
            result
        );
    }

    /// Assert that no executed statement still names `source_catalog`.
    pub fn assert_translated(statements: &[String], source_catalog: &str) {
        let needle = format!("{}.", source_catalog);
        for statement in statements {
            assert!(
                !statement.contains(&needle),
                "Statement reached the engine untranslated: {}",
                statement
            );
        }
    }
}
