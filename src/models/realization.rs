use crate::catalog::CatalogRow;
use crate::constants::defaults;
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};

/// Realization definition
/// Maps to `etl_realizations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizationDefinition {
    pub id: i64,
    pub package_id: i64,
    pub name: String,
    pub locked: bool,
    /// Siblings sharing a priority run together; lower tiers run first
    pub priority: i64,
    pub max_parallel_steps: usize,
}

impl TryFrom<&CatalogRow> for RealizationDefinition {
    type Error = OrchestratorError;

    fn try_from(row: &CatalogRow) -> Result<Self> {
        let max_parallel_steps = match row.get_opt_i64("max_parallel_steps")? {
            Some(n) if n >= 1 => usize::try_from(n).unwrap_or(defaults::MAX_PARALLEL_STEPS),
            _ => defaults::MAX_PARALLEL_STEPS,
        };
        Ok(Self {
            id: row.get_i64("realization_id")?,
            package_id: row.get_i64("package_id")?,
            name: row.get_string("name")?,
            locked: row.get_bool("locked")?,
            priority: row.get_opt_i64("priority")?.unwrap_or(0),
            max_parallel_steps,
        })
    }
}

/// Group realizations into priority tiers, lowest priority value first
///
/// Catalog order is kept inside a tier.
pub fn priority_tiers(realizations: Vec<RealizationDefinition>) -> Vec<Vec<RealizationDefinition>> {
    let mut sorted = realizations;
    sorted.sort_by_key(|r| r.priority);

    let mut tiers: Vec<Vec<RealizationDefinition>> = Vec::new();
    for realization in sorted {
        match tiers.last_mut() {
            Some(tier) if tier[0].priority == realization.priority => tier.push(realization),
            _ => tiers.push(vec![realization]),
        }
    }
    tiers
}
