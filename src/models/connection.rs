use crate::catalog::CatalogRow;
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical backend tag of a catalog connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Postgres,
    MySql,
    SqlServer,
    Oracle,
    Db2,
    Odbc,
    File,
    /// Any tag without a connector
    Other(String),
}

impl BackendKind {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Self::Postgres,
            "mysql" => Self::MySql,
            "sqlserver" | "mssql" => Self::SqlServer,
            "oracle" => Self::Oracle,
            "db2" => Self::Db2,
            "odbc" => Self::Odbc,
            "file" => Self::File,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MySql => write!(f, "mysql"),
            Self::SqlServer => write!(f, "sqlserver"),
            Self::Oracle => write!(f, "oracle"),
            Self::Db2 => write!(f, "db2"),
            Self::Odbc => write!(f, "odbc"),
            Self::File => write!(f, "file"),
            Self::Other(tag) => write!(f, "{tag}"),
        }
    }
}

/// Connection attributes for one source or destination
/// Maps to `etl_connections`; `attributes` is a JSON object of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: i64,
    pub name: String,
    pub backend: BackendKind,
    pub attributes: BTreeMap<String, String>,
}

impl ConnectionInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl TryFrom<&CatalogRow> for ConnectionInfo {
    type Error = OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        let attributes = match row.get_opt_string("attributes") {
            Some(text) if !text.trim().is_empty() => {
                let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)?;
                raw.into_iter()
                    .map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (key, value)
                    })
                    .collect()
            }
            _ => BTreeMap::new(),
        };
        Ok(Self {
            id: row.get_i64("connection_id")?,
            name: row.get_string("name")?,
            backend: BackendKind::parse(&row.get_string("backend")?),
            attributes,
        })
    }
}
