//! Result assembly

use remodel_core::{MigrationStatement, RankedQuery, RefinementArtifact, TableDefinition};

/// Schema and migrations the query phase works against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommittedSchema {
    pub tables: Vec<TableDefinition>,
    pub migrations: Vec<MigrationStatement>,
    /// Every table and migration ran cleanly in the sandbox.
    pub validated: bool,
}

/// Package the committed schema and the rewritten queries.
///
/// Nothing is re-validated; the last validated state is trusted. Queries
/// keep the order they were refined in.
pub fn assemble(schema: &CommittedSchema, rewritten: Vec<RankedQuery>) -> RefinementArtifact {
    RefinementArtifact::new(schema.tables.clone(), schema.migrations.clone(), rewritten)
}
