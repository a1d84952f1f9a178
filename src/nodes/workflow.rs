//! Workflow level: dispatches every package of the workflow in catalog order.

use super::arena::NodeKey;
use super::core::{NodeBehavior, NodeCore};
use super::package::ensure_package;
use crate::constants::Level;
use crate::error::Result;
use crate::models::PackageDefinition;
use crate::state_machine::WorkflowEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct WorkflowBehavior {
    packages: Vec<PackageDefinition>,
}

impl WorkflowBehavior {
    pub fn new(packages: Vec<PackageDefinition>) -> Self {
        Self { packages }
    }
}

#[async_trait]
impl NodeBehavior for WorkflowBehavior {
    async fn start(&self, node: &Arc<NodeCore>) -> Result<()> {
        node.shared()
            .lifecycle()
            .transition(node.id(), WorkflowEvent::BeginExecution)?;
        info!(
            workflow_id = node.id(),
            packages = self.packages.len(),
            "🚀 Workflow executing"
        );

        let mut pending = Vec::with_capacity(self.packages.len());
        for package in &self.packages {
            node.check_cancelled("dispatching packages")?;
            let handle = ensure_package(node, package.id, Some(package.clone())).await?;
            pending.push((NodeKey::new(Level::Package, package.id), handle));
        }

        node.await_children(pending).await?;
        // dependency packages constructed for this run are children too
        node.await_all_children().await
    }
}
