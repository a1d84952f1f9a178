use crate::catalog::CatalogRow;
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// What the data mover does for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    BulkCopy,
    TimeSlicedCopy,
    FileToTable,
    ParametrizedExecution,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkCopy => write!(f, "bulk_copy"),
            Self::TimeSlicedCopy => write!(f, "time_sliced_copy"),
            Self::FileToTable => write!(f, "file_to_table"),
            Self::ParametrizedExecution => write!(f, "parametrized_execution"),
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bulk_copy" => Ok(Self::BulkCopy),
            "time_sliced_copy" => Ok(Self::TimeSlicedCopy),
            "file_to_table" => Ok(Self::FileToTable),
            "parametrized_execution" => Ok(Self::ParametrizedExecution),
            other => Err(OrchestratorError::Catalog(format!("unknown step kind: {other}"))),
        }
    }
}

/// Step definition
/// Maps to `etl_steps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: i64,
    pub realization_id: i64,
    pub name: String,
    pub locked: bool,
    pub sequence: i64,
    pub kind: StepKind,
    pub source_connection_id: Option<i64>,
    pub destination_connection_id: Option<i64>,
    /// Raw table names, possibly holding `${NAME}` placeholders
    pub source_tables: Vec<String>,
    pub target_tables: Vec<String>,
    pub payload: Value,
}

impl StepDefinition {
    /// Sorted, de-duplicated union of source and target tables
    pub fn tables(&self) -> Vec<String> {
        self.source_tables
            .iter()
            .chain(self.target_tables.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn split_tables(raw: Option<String>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl TryFrom<&CatalogRow> for StepDefinition {
    type Error = OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        let payload = match row.get_opt_string("payload") {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
            _ => Value::Null,
        };
        Ok(Self {
            id: row.get_i64("step_id")?,
            realization_id: row.get_i64("realization_id")?,
            name: row.get_string("name")?,
            locked: row.get_bool("locked")?,
            sequence: row.get_opt_i64("sequence")?.unwrap_or(0),
            kind: row.get_string("kind")?.parse()?,
            source_connection_id: row.get_opt_i64("source_connection_id")?,
            destination_connection_id: row.get_opt_i64("destination_connection_id")?,
            source_tables: split_tables(row.get_opt_string("source_tables")),
            target_tables: split_tables(row.get_opt_string("target_tables")),
            payload,
        })
    }
}
