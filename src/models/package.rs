use crate::catalog::CatalogRow;
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};

/// Package definition
/// Maps to `etl_packages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub id: i64,
    pub workflow_id: i64,
    pub name: String,
    pub locked: bool,
    /// Position in catalog order within the workflow
    pub order: i64,
}

impl TryFrom<&CatalogRow> for PackageDefinition {
    type Error = OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("package_id")?,
            workflow_id: row.get_i64("workflow_id")?,
            name: row.get_string("name")?,
            locked: row.get_bool("locked")?,
            order: row.get_opt_i64("sort_order")?.unwrap_or(0),
        })
    }
}

/// `package_id` needs `depends_on_package_id` complete before it starts
/// Maps to `etl_package_dependencies`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDependency {
    pub package_id: i64,
    pub depends_on_package_id: i64,
}

impl TryFrom<&CatalogRow> for PackageDependency {
    type Error = OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        Ok(Self {
            package_id: row.get_i64("package_id")?,
            depends_on_package_id: row.get_i64("depends_on_package_id")?,
        })
    }
}
