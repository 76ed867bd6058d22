//! Input normalization
//!
//! Turns a submitted [`TaskPayload`] into the canonical model the
//! refinement loop works on: the caller's source namespace, the table
//! definitions in submission order, and the workload ranked by weight.

use crate::{InputError, RankedQuery, SourceNamespace, TableDefinition, TaskPayload};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches the first two dot-separated segments after `CREATE TABLE`.
/// Identifiers may be double-quoted; quoted names keep their quotes so
/// they can be used for literal rewriting.
static CREATE_TABLE_QUALIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+(?:OR\s+REPLACE\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?("(?:[^"]|"")+"|[^\s."(]+)\s*\.\s*("(?:[^"]|"")+"|[^\s."(]+)\s*\."#,
    )
    .expect("Invalid CREATE TABLE regex")
});

/// Canonical form of one task's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTask {
    pub source: SourceNamespace,
    pub tables: Vec<TableDefinition>,
    pub queries: Vec<RankedQuery>,
}

/// Extract catalog and schema from a fully qualified `CREATE TABLE`.
pub fn extract_source_namespace(statement: &str) -> Result<SourceNamespace, InputError> {
    let captures = CREATE_TABLE_QUALIFIER
        .captures(statement)
        .ok_or_else(|| InputError::SchemaExtraction {
            statement: statement.to_string(),
        })?;

    match (captures.get(1), captures.get(2)) {
        (Some(catalog), Some(schema)) => Ok(SourceNamespace {
            catalog: catalog.as_str().to_string(),
            schema: schema.as_str().to_string(),
        }),
        _ => Err(InputError::SchemaExtraction {
            statement: statement.to_string(),
        }),
    }
}

/// Normalize a task payload.
///
/// The namespace comes from the first table definition, which must be fully
/// qualified. Queries are ordered by descending weight; ties keep their
/// submission order.
pub fn normalize(payload: &TaskPayload) -> Result<NormalizedTask, InputError> {
    let tables: Vec<TableDefinition> = payload
        .ddl
        .iter()
        .map(|d| d.statement.trim())
        .filter(|s| !s.is_empty())
        .map(TableDefinition::new)
        .collect();

    let first = tables.first().ok_or_else(|| InputError::EmptyInput {
        what: "table definitions".to_string(),
    })?;
    let source = extract_source_namespace(first.as_str())?;

    Ok(NormalizedTask {
        source,
        tables,
        queries: rank_queries(payload.queries.iter().map(|q| q.to_ranked()).collect()),
    })
}

/// Sort queries by non-increasing weight. The sort is stable.
pub fn rank_queries(mut queries: Vec<RankedQuery>) -> Vec<RankedQuery> {
    queries.sort_by(|a, b| b.weight.cmp(&a.weight));
    queries
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawDdl, RawQuery};

    fn raw_query(id: &str, run: u64, exec: u64) -> RawQuery {
        RawQuery {
            queryid: id.to_string(),
            query: format!("SELECT {}", id),
            runquantity: run,
            executiontime: exec,
        }
    }

    fn payload(ddls: &[&str], queries: Vec<RawQuery>) -> TaskPayload {
        TaskPayload {
            url: "jdbc:trino://localhost:8080".to_string(),
            ddl: ddls
                .iter()
                .map(|s| RawDdl {
                    statement: s.to_string(),
                })
                .collect(),
            queries,
        }
    }

    #[test]
    fn test_extract_plain() {
        let ns = extract_source_namespace("CREATE TABLE cat.src.orders (id INT)").unwrap();
        assert_eq!(ns.catalog, "cat");
        assert_eq!(ns.schema, "src");
    }

    #[test]
    fn test_extract_case_and_whitespace() {
        let ns = extract_source_namespace("create\n  table\ticeberg . sales.t (x int)").unwrap();
        assert_eq!(ns.catalog, "iceberg");
        assert_eq!(ns.schema, "sales");
    }

    #[test]
    fn test_extract_modifiers_and_quotes() {
        let ns = extract_source_namespace(
            "CREATE OR REPLACE TABLE IF NOT EXISTS \"My Cat\".\"src\".orders (id INT)",
        )
        .unwrap();
        assert_eq!(ns.catalog, "\"My Cat\"");
        assert_eq!(ns.schema, "\"src\"");
    }

    #[test]
    fn test_extract_unqualified_fails() {
        let err = extract_source_namespace("CREATE TABLE orders (id INT)").unwrap_err();
        assert!(matches!(err, InputError::SchemaExtraction { .. }));

        let err = extract_source_namespace("CREATE TABLE src.orders (id INT)").unwrap_err();
        assert!(matches!(err, InputError::SchemaExtraction { .. }));
    }

    #[test]
    fn test_normalize_empty_input() {
        let err = normalize(&payload(&[], vec![])).unwrap_err();
        assert!(matches!(err, InputError::EmptyInput { .. }));

        let err = normalize(&payload(&["   "], vec![])).unwrap_err();
        assert!(matches!(err, InputError::EmptyInput { .. }));
    }

    #[test]
    fn test_normalize_uses_first_ddl() {
        let task = normalize(&payload(
            &[
                "CREATE TABLE cat.src.orders (id INT)",
                "CREATE TABLE other.x.items (id INT)",
            ],
            vec![],
        ))
        .unwrap();
        assert_eq!(task.source.catalog, "cat");
        assert_eq!(task.tables.len(), 2);
    }

    #[test]
    fn test_normalize_first_ddl_unqualified_is_fatal() {
        let err = normalize(&payload(
            &["CREATE TABLE orders (id INT)", "CREATE TABLE cat.src.items (id INT)"],
            vec![],
        ))
        .unwrap_err();
        assert!(matches!(err, InputError::SchemaExtraction { .. }));
    }

    #[test]
    fn test_normalize_ranks_queries_stably() {
        let task = normalize(&payload(
            &["CREATE TABLE cat.src.orders (id INT)"],
            vec![
                raw_query("a", 1, 10),
                raw_query("b", 10, 5),
                raw_query("c", 5, 2),
                raw_query("d", 2, 5),
            ],
        ))
        .unwrap();
        let ids: Vec<&str> = task.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
        assert_eq!(task.queries[0].weight, 50);
    }

    #[test]
    fn test_normalize_keeps_duplicate_query_ids() {
        let mut heavy = raw_query("q1", 10, 10);
        heavy.query = "SELECT heavy".to_string();
        let task = normalize(&payload(
            &["CREATE TABLE cat.src.orders (id INT)"],
            vec![raw_query("q1", 1, 1), heavy],
        ))
        .unwrap();

        // Ids are not deduplicated; each entry keeps its own text and weight.
        assert_eq!(task.queries.len(), 2);
        assert!(task.queries.iter().all(|q| q.id == "q1"));
        assert_eq!(task.queries[0].text, "SELECT heavy");
        assert_eq!(task.queries[1].text, "SELECT q1");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn queries() -> impl Strategy<Value = Vec<RankedQuery>> {
        prop::collection::vec(0u64..20, 0..30).prop_map(|weights| {
            weights
                .into_iter()
                .enumerate()
                .map(|(i, w)| RankedQuery::new(format!("q{}", i), format!("SELECT {}", i), w))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ranking_is_sorted_stable_permutation(input in queries()) {
            let ranked = rank_queries(input.clone());

            prop_assert_eq!(ranked.len(), input.len());
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].weight >= pair[1].weight);
                if pair[0].weight == pair[1].weight {
                    let a = input.iter().position(|q| q.id == pair[0].id);
                    let b = input.iter().position(|q| q.id == pair[1].id);
                    prop_assert!(a < b);
                }
            }

            let mut in_ids: Vec<&str> = input.iter().map(|q| q.id.as_str()).collect();
            let mut out_ids: Vec<&str> = ranked.iter().map(|q| q.id.as_str()).collect();
            in_ids.sort_unstable();
            out_ids.sort_unstable();
            prop_assert_eq!(in_ids, out_ids);
        }
    }
}
