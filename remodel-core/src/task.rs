//! Task payload and lifecycle types

use crate::{query_weight, InputError, RankedQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PAYLOAD
// ============================================================================

/// One table definition as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDdl {
    pub statement: String,
}

/// One workload query as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuery {
    pub queryid: String,
    pub query: String,
    pub runquantity: u64,
    pub executiontime: u64,
}

impl RawQuery {
    pub fn weight(&self) -> u64 {
        query_weight(self.runquantity, self.executiontime)
    }

    pub fn to_ranked(&self) -> RankedQuery {
        RankedQuery::new(self.queryid.clone(), self.query.clone(), self.weight())
    }
}

/// A submitted optimization task.
///
/// `url` is the JDBC url of the caller's cluster. It is stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub url: String,
    pub ddl: Vec<RawDdl>,
    pub queries: Vec<RawQuery>,
}

impl TaskPayload {
    /// Structural checks done at submission time.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.ddl.iter().all(|d| d.statement.trim().is_empty()) {
            return Err(InputError::EmptyInput {
                what: "table definitions".to_string(),
            });
        }
        for query in &self.queries {
            if query.queryid.trim().is_empty() {
                return Err(InputError::InvalidQuery {
                    query_id: query.queryid.clone(),
                    reason: "query id is empty".to_string(),
                });
            }
            if query.query.trim().is_empty() {
                return Err(InputError::InvalidQuery {
                    query_id: query.queryid.clone(),
                    reason: "query text is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Task lifecycle status as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "RUNNING",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(TaskStatus::Running),
            "DONE" => Ok(TaskStatus::Done),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

// ============================================================================
// JDBC URL
// ============================================================================

/// Connection details extracted from a JDBC url.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcTarget {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for JdbcTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcTarget")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Parse `jdbc:<scheme>://host[:port][/path]?user=..&password=..`.
///
/// The `jdbc:` prefix is optional.
pub fn parse_jdbc_url(raw: &str) -> Result<JdbcTarget, InputError> {
    let stripped = raw.strip_prefix("jdbc:").unwrap_or(raw);
    let parsed = url::Url::parse(stripped).map_err(|e| InputError::InvalidUrl {
        url: redact(raw),
        reason: e.to_string(),
    })?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| InputError::InvalidUrl {
            url: redact(raw),
            reason: "missing host".to_string(),
        })?
        .to_string();

    let mut user = None;
    let mut password = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "user" => user = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(JdbcTarget {
        scheme: parsed.scheme().to_string(),
        host,
        port: parsed.port(),
        user,
        password,
    })
}

/// Drop the query string so credentials never reach error messages.
fn redact(raw: &str) -> String {
    match raw.split_once('?') {
        Some((base, _)) => format!("{}?[REDACTED]", base),
        None => raw.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TaskPayload {
        TaskPayload {
            url: "jdbc:trino://localhost:8080".to_string(),
            ddl: vec![RawDdl {
                statement: "CREATE TABLE cat.src.orders (id INT)".to_string(),
            }],
            queries: vec![RawQuery {
                queryid: "q1".to_string(),
                query: "SELECT * FROM cat.src.orders".to_string(),
                runquantity: 10,
                executiontime: 5,
            }],
        }
    }

    #[test]
    fn test_payload_json_shape() {
        let json = r#"{
            "url": "jdbc:trino://localhost:8080",
            "ddl": [{"statement": "CREATE TABLE cat.src.orders (id INT)"}],
            "queries": [{"queryid": "q1", "query": "SELECT * FROM cat.src.orders", "runquantity": 10, "executiontime": 5}]
        }"#;
        let parsed: TaskPayload = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, payload());
        assert_eq!(parsed.queries[0].weight(), 50);
    }

    #[test]
    fn test_payload_validate() {
        assert!(payload().validate().is_ok());

        let mut empty = payload();
        empty.ddl.clear();
        assert!(matches!(empty.validate(), Err(InputError::EmptyInput { .. })));

        let mut blank_query = payload();
        blank_query.queries[0].query = "  ".to_string();
        assert!(matches!(
            blank_query.validate(),
            Err(InputError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [TaskStatus::Running, TaskStatus::Done, TaskStatus::Failed] {
            assert_eq!(status.as_db_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<TaskStatus>().is_err());
        assert_eq!(serde_json::to_string(&TaskStatus::Done).unwrap(), "\"DONE\"");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_parse_jdbc_url() {
        let target =
            parse_jdbc_url("jdbc:trino://trino.local:8443/iceberg?user=alice&password=s3cret")
                .unwrap();
        assert_eq!(target.scheme, "trino");
        assert_eq!(target.host, "trino.local");
        assert_eq!(target.port, Some(8443));
        assert_eq!(target.user.as_deref(), Some("alice"));
        assert_eq!(target.password.as_deref(), Some("s3cret"));

        let debug = format!("{:?}", target);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_jdbc_url_without_credentials() {
        let target = parse_jdbc_url("trino://host").unwrap();
        assert_eq!(target.host, "host");
        assert_eq!(target.port, None);
        assert!(target.user.is_none());
    }

    #[test]
    fn test_parse_jdbc_url_errors_hide_password() {
        let err = parse_jdbc_url("jdbc:not a url?password=s3cret").unwrap_err();
        assert!(!format!("{}", err).contains("s3cret"));
    }
}
