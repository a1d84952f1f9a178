//! Hierarchy fixtures over [`MemoryCatalog`].

use crate::catalog::MemoryCatalog;
use crate::models::{
    PackageDefinition, RealizationDefinition, StepDefinition, StepKind, WorkflowDefinition,
};
use serde_json::Value;
use std::sync::Arc;

pub fn package_definition(id: i64, workflow_id: i64, locked: bool, order: i64) -> PackageDefinition {
    PackageDefinition {
        id,
        workflow_id,
        name: format!("package-{id}"),
        locked,
        order,
    }
}

pub fn realization_definition(
    id: i64,
    package_id: i64,
    priority: i64,
    max_parallel_steps: usize,
) -> RealizationDefinition {
    RealizationDefinition {
        id,
        package_id,
        name: format!("realization-{id}"),
        locked: false,
        priority,
        max_parallel_steps,
    }
}

pub fn step_definition(
    id: i64,
    realization_id: i64,
    sequence: i64,
    target_tables: &[&str],
) -> StepDefinition {
    StepDefinition {
        id,
        realization_id,
        name: format!("step-{id}"),
        locked: false,
        sequence,
        kind: StepKind::BulkCopy,
        source_connection_id: None,
        destination_connection_id: None,
        source_tables: Vec::new(),
        target_tables: target_tables.iter().map(|t| t.to_string()).collect(),
        payload: Value::Null,
    }
}

/// Builds a catalog hierarchy with generated names
#[derive(Debug, Clone, Default)]
pub struct HierarchyFixture {
    catalog: Arc<MemoryCatalog>,
}

impl HierarchyFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> Arc<MemoryCatalog> {
        self.catalog.clone()
    }

    pub fn workflow(&self, id: i64, locked: bool) -> &Self {
        self.catalog
            .add_workflow(id, &format!("workflow-{id}"), locked);
        self
    }

    /// Definition of a workflow with a fresh pending schedule run
    pub fn scheduled(&self, id: i64) -> WorkflowDefinition {
        let schedule_run_id = self.catalog.schedule(id);
        WorkflowDefinition {
            id,
            name: format!("workflow-{id}"),
            locked: false,
            schedule_run_id,
        }
    }

    pub fn package(&self, id: i64, workflow_id: i64, locked: bool) -> &Self {
        self.catalog
            .add_package(package_definition(id, workflow_id, locked, id));
        self
    }

    pub fn dependency(&self, package_id: i64, depends_on: i64) -> &Self {
        self.catalog.add_dependency(package_id, depends_on);
        self
    }

    pub fn realization(&self, id: i64, package_id: i64, priority: i64) -> &Self {
        self.catalog
            .add_realization(realization_definition(id, package_id, priority, 8));
        self
    }

    pub fn realization_with(&self, definition: RealizationDefinition) -> &Self {
        self.catalog.add_realization(definition);
        self
    }

    /// Step writing `tables`, sequenced by id
    pub fn step(&self, id: i64, realization_id: i64, tables: &[&str]) -> &Self {
        self.catalog
            .add_step(step_definition(id, realization_id, id, tables));
        self
    }

    pub fn step_with(&self, definition: StepDefinition) -> &Self {
        self.catalog.add_step(definition);
        self
    }

    /// Unlocked workflow → package → realization chain at priority 1
    pub fn chain(&self, workflow_id: i64, package_id: i64, realization_id: i64) -> &Self {
        self.workflow(workflow_id, false)
            .package(package_id, workflow_id, false)
            .realization(realization_id, package_id, 1)
    }
}
