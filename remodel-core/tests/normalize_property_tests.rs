//! Property tests for input normalization and namespace translation.

use proptest::prelude::*;
use remodel_core::{
    extract_source_namespace, normalize, rank_queries, rewrite, NamespaceContext, RankedQuery,
    RawDdl, RawQuery, SourceNamespace, TaskPayload,
};

fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn arb_source_catalog() -> impl Strategy<Value = String> {
    "src_[a-z]{1,6}"
}

fn arb_queries() -> impl Strategy<Value = Vec<RankedQuery>> {
    prop::collection::vec(0u64..20, 0..12).prop_map(|weights| {
        weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| RankedQuery::new(format!("q{}", i), format!("SELECT {}", i), w))
            .collect()
    })
}

proptest! {
    /// Ranking is a permutation, ordered by non-increasing weight, stable on ties.
    #[test]
    fn prop_rank_queries_is_stable_descending(queries in arb_queries()) {
        let ranked = rank_queries(queries.clone());
        prop_assert_eq!(ranked.len(), queries.len());

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].weight >= pair[1].weight);
            if pair[0].weight == pair[1].weight {
                let pos = |q: &RankedQuery| queries.iter().position(|o| o.id == q.id);
                prop_assert!(pos(&pair[0]) < pos(&pair[1]));
            }
        }
    }

    /// Catalog and schema come from the first two qualifiers of the table name.
    #[test]
    fn prop_extracts_qualified_namespace(
        catalog in arb_identifier(),
        schema in arb_identifier(),
        table in arb_identifier(),
        if_not_exists in any::<bool>(),
    ) {
        let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
        let ddl = format!("CREATE TABLE {}{}.{}.{} (id INT)", guard, catalog, schema, table);

        let source = extract_source_namespace(&ddl).unwrap();
        prop_assert_eq!(source.catalog, catalog);
        prop_assert_eq!(source.schema, schema);
    }

    /// Blank definitions are dropped and the rest keep submission order.
    #[test]
    fn prop_normalize_keeps_ddl_order(
        tables in prop::collection::vec(arb_identifier(), 1..6),
        blanks in prop::collection::vec(any::<bool>(), 6),
    ) {
        let mut ddl = Vec::new();
        for (i, table) in tables.iter().enumerate() {
            ddl.push(RawDdl { statement: format!("CREATE TABLE cat.src.{} (id INT)", table) });
            if blanks[i] {
                ddl.push(RawDdl { statement: "   ".to_string() });
            }
        }
        let payload = TaskPayload {
            url: "jdbc:trino://localhost:8080".to_string(),
            ddl,
            queries: vec![RawQuery {
                queryid: "q1".to_string(),
                query: "SELECT 1".to_string(),
                runquantity: 2,
                executiontime: 3,
            }],
        };

        let normalized = normalize(&payload).unwrap();
        prop_assert_eq!(normalized.tables.len(), tables.len());
        for (definition, table) in normalized.tables.iter().zip(&tables) {
            let suffix = format!(".{} (id INT)", table);
            prop_assert!(
                definition.as_str().ends_with(&suffix),
                "{} does not end with {}",
                definition.as_str(),
                suffix
            );
        }
        prop_assert_eq!(normalized.source.catalog, "cat");
        prop_assert_eq!(normalized.queries[0].weight, 6);
    }

    /// Every source-catalog qualifier is replaced; schemas stay untouched.
    #[test]
    fn prop_rewrite_targets_sandbox(
        catalog in arb_source_catalog(),
        schema in arb_identifier(),
        left in arb_identifier(),
        right in arb_identifier(),
    ) {
        let ctx = NamespaceContext::new(
            SourceNamespace { catalog: catalog.clone(), schema: schema.clone() },
            "sandbox",
            "remodel",
        );
        let sql = format!(
            "SELECT * FROM {c}.{s}.{l} JOIN {c}.{s}.{r} USING (id)",
            c = catalog, s = schema, l = left, r = right
        );

        let rewritten = rewrite(&sql, &ctx);
        prop_assert_eq!(
            rewritten,
            format!(
                "SELECT * FROM sandbox.{s}.{l} JOIN sandbox.{s}.{r} USING (id)",
                s = schema, l = left, r = right
            )
        );
    }
}

#[test]
fn test_unqualified_first_ddl_is_rejected() {
    let payload = TaskPayload {
        url: "jdbc:trino://localhost:8080".to_string(),
        ddl: vec![
            RawDdl { statement: "CREATE TABLE orders (id INT)".to_string() },
            RawDdl { statement: "CREATE TABLE cat.src.items (id INT)".to_string() },
        ],
        queries: vec![],
    };
    assert!(normalize(&payload).is_err());
}
