use crate::catalog::CatalogRow;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow due for execution
/// Maps to `etl_workflows` joined with its current `etl_schedule_runs` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: i64,
    pub name: String,
    pub locked: bool,
    pub schedule_run_id: i64,
}

impl TryFrom<&CatalogRow> for WorkflowDefinition {
    type Error = crate::error::OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("workflow_id")?,
            name: row.get_string("name")?,
            locked: row.get_bool("locked")?,
            schedule_run_id: row.get_opt_i64("schedule_run_id")?.unwrap_or(-1),
        })
    }
}

/// Named substitution values for `${NAME}` placeholders in step tables
/// Maps to `etl_workflow_parameters`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowParameters {
    values: HashMap<String, String>,
}

impl WorkflowParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[CatalogRow]) -> Result<Self> {
        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            values.insert(row.get_string("name")?, row.get_string("value")?);
        }
        Ok(Self { values })
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
