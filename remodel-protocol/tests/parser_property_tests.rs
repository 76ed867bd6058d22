//! Property tests for the completion response parser.

use proptest::prelude::*;
use remodel_core::{MigrationStatement, RankedQuery, RefinementArtifact, TableDefinition};
use remodel_protocol::{parse, render_response, DEFAULT_TERMINATOR};

/// Single-line statements free of separators and section markers.
fn statement() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_ ,()*=]{0,40}".prop_map(|s| format!("select {}", s.trim_end()))
}

fn artifact() -> impl Strategy<Value = RefinementArtifact> {
    (
        prop::collection::vec(statement(), 0..5),
        prop::collection::vec(statement(), 0..5),
        prop::collection::vec(("[a-z][a-z0-9-]{0,10}", statement()), 0..5),
    )
        .prop_map(|(tables, migrations, queries)| RefinementArtifact {
            tables: tables.into_iter().map(TableDefinition::new).collect(),
            migrations: migrations.into_iter().map(MigrationStatement::new).collect(),
            queries: queries
                .into_iter()
                .map(|(id, text)| RankedQuery::new(id, text, 0))
                .collect(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Arbitrary text never panics the parser.
    #[test]
    fn prop_parse_total(text in any::<String>()) {
        let _ = parse(&text);
    }

    /// Arbitrary text wrapped around the markers never panics either.
    #[test]
    fn prop_parse_total_with_markers(
        a in ".{0,40}",
        b in ".{0,40}",
        c in ".{0,40}",
    ) {
        let text = format!("DDLS:{}MIGRATIONS:{}QUERIES:{}#END#", a, b, c);
        let _ = parse(&text);
    }

    /// The layout the prompts ask for decodes to what was rendered.
    #[test]
    fn prop_rendered_layout_decodes(artifact in artifact()) {
        let text = render_response(&artifact, DEFAULT_TERMINATOR);
        prop_assert_eq!(parse(&text), artifact);
    }
}
