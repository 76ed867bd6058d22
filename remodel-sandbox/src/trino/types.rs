//! Trino client protocol types

use serde::Deserialize;

/// One page of the statement protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    #[serde(default)]
    pub error: Option<QueryError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    #[serde(default)]
    pub error_name: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl QueryError {
    /// Message fed back to the completion service.
    pub fn describe(&self) -> String {
        match &self.error_name {
            Some(name) => format!("{} ({})", self.message, name),
            None => self.message.clone(),
        }
    }
}
