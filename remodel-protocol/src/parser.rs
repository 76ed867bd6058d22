//! Completion response parser
//!
//! Decodes the three-section text layout described in [`crate::grammar`]
//! into a [`RefinementArtifact`]. Parsing never fails: a missing section
//! yields an empty list and malformed lines are skipped. Deciding whether
//! an empty result is acceptable is left to the caller.

use crate::grammar::{
    DDLS_MARKER, DEFAULT_TERMINATOR, MIGRATIONS_MARKER, ORDINAL_SEPARATOR, QUERIES_MARKER,
    QUERY_BLOCK_SEPARATOR, QUERY_ID_LABEL, QUERY_LABEL,
};
use remodel_core::{MigrationStatement, RankedQuery, RefinementArtifact, TableDefinition};

/// Parse a response using the default terminator.
pub fn parse(raw: &str) -> RefinementArtifact {
    parse_with_terminator(raw, DEFAULT_TERMINATOR)
}

/// Parse a response; text from the first `terminator` onward is ignored.
///
/// Parsed queries carry weight 0. Their priority belongs to the original
/// query with the same id.
pub fn parse_with_terminator(raw: &str, terminator: &str) -> RefinementArtifact {
    let body = match raw.find(terminator) {
        Some(pos) if !terminator.is_empty() => &raw[..pos],
        _ => raw,
    };
    let sections = Sections::split(body);

    RefinementArtifact {
        tables: statement_lines(sections.ddls)
            .map(TableDefinition::new)
            .collect(),
        migrations: statement_lines(sections.migrations)
            .map(MigrationStatement::new)
            .collect(),
        queries: query_blocks(sections.queries),
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct Sections<'a> {
    ddls: &'a str,
    migrations: &'a str,
    queries: &'a str,
}

impl<'a> Sections<'a> {
    /// Markers are searched in order, each after the previous one found.
    /// A section runs to the next marker found, or to the end of the text.
    fn split(text: &'a str) -> Self {
        let mut cursor = 0;
        let mut found: [Option<(usize, usize)>; 3] = [None; 3];

        for (slot, marker) in [DDLS_MARKER, MIGRATIONS_MARKER, QUERIES_MARKER]
            .iter()
            .enumerate()
        {
            if let Some(offset) = text[cursor..].find(marker) {
                let start = cursor + offset;
                let content = start + marker.len();
                found[slot] = Some((start, content));
                cursor = content;
            }
        }

        let body = |slot: usize| -> &'a str {
            let Some((_, content)) = found[slot] else {
                return "";
            };
            let end = found[slot + 1..]
                .iter()
                .flatten()
                .map(|(start, _)| *start)
                .next()
                .unwrap_or(text.len());
            &text[content..end]
        };

        Sections {
            ddls: body(0),
            migrations: body(1),
            queries: body(2),
        }
    }
}

// ============================================================================
// LINE RULES
// ============================================================================

/// Each line loses everything up to and including its first `.`, then is
/// trimmed; empty results are dropped. A line without a `.` is kept whole.
fn statement_lines(section: &str) -> impl Iterator<Item = &str> {
    section.lines().filter_map(|line| {
        let rest = match line.find(ORDINAL_SEPARATOR) {
            Some(pos) => &line[pos + ORDINAL_SEPARATOR.len_utf8()..],
            None => line,
        };
        let statement = rest.trim();
        (!statement.is_empty()).then_some(statement)
    })
}

/// Split on `;` into blocks. In a block, the text after `QUERY_ID:` is the
/// id and a line starting with `QUERY:` is the statement. Unlabeled lines
/// are ignored. A block needs both to produce a query.
fn query_blocks(section: &str) -> Vec<RankedQuery> {
    let mut queries = Vec::new();

    for block in section.split(QUERY_BLOCK_SEPARATOR) {
        let mut id: Option<&str> = None;
        let mut statement: Option<&str> = None;

        for line in block.lines() {
            if let Some(pos) = line.find(QUERY_ID_LABEL) {
                let value = line[pos + QUERY_ID_LABEL.len()..].trim();
                if !value.is_empty() {
                    id = Some(value);
                }
                continue;
            }
            if let Some(rest) = line.trim().strip_prefix(QUERY_LABEL) {
                let value = rest.trim();
                if !value.is_empty() {
                    statement = Some(value);
                }
            }
        }

        if let (Some(id), Some(statement)) = (id, statement) {
            queries.push(RankedQuery::new(id, statement, 0));
        }
    }

    queries
}

// ============================================================================
// TESTS
// ============================================================================
