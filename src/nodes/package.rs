//! Package level.
//!
//! A package first resolves its declared dependencies through the
//! [`PackageExecutionRegistry`](super::dependencies::PackageExecutionRegistry),
//! then runs its realizations in priority tiers: same-tier realizations run
//! concurrently and each tier completes before the next one starts.
//!
//! Dependencies are awaited before Init, so a package blocked on another
//! package never holds a slot in its level's counters meanwhile.

use super::arena::NodeKey;
use super::completion::CompletionHandle;
use super::core::{spawn_node, NodeBehavior, NodeCore, NodeSpec};
use super::dependencies::Claim;
use super::realization::RealizationBehavior;
use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use crate::models::{priority_tiers, PackageDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PackageBehavior {
    definition: PackageDefinition,
}

impl PackageBehavior {
    pub fn new(definition: PackageDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl NodeBehavior for PackageBehavior {
    async fn prepare(&self, node: &Arc<NodeCore>) -> Result<()> {
        let shared = node.shared().clone();
        let dependencies = shared
            .catalog()
            .package_dependencies(node.id())
            .await
            .map_err(node.contextual("package_dependencies"))?;
        if dependencies.is_empty() {
            return Ok(());
        }

        let workflow = shared
            .arena()
            .get(NodeKey::workflow(node.workflow_id()))
            .ok_or_else(|| OrchestratorError::DependencyFailed {
                package_id: node.id(),
                reason: format!("workflow {} is no longer live", node.workflow_id()),
            })?;

        let mut handles = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            let depends_on = dependency.depends_on_package_id;
            if depends_on == node.id() {
                return Err(OrchestratorError::DependencyFailed {
                    package_id: node.id(),
                    reason: "package depends on itself".to_string(),
                });
            }
            let handle = ensure_package(&workflow, depends_on, None).await?;
            handles.push((depends_on, handle));
        }

        for (depends_on, handle) in handles {
            debug!(package_id = node.id(), depends_on, "⏳ awaiting dependency");
            let outcome = tokio::select! {
                biased;
                _ = node.cancel_token().cancelled() => {
                    return Err(OrchestratorError::cancelled("package dependency"));
                }
                outcome = handle.wait() => outcome,
            };
            if !outcome.is_finished() {
                return Err(OrchestratorError::DependencyFailed {
                    package_id: node.id(),
                    reason: format!("dependency {depends_on} {outcome}"),
                });
            }
        }
        Ok(())
    }

    async fn start(&self, node: &Arc<NodeCore>) -> Result<()> {
        let realizations = node
            .shared()
            .catalog()
            .realizations(node.id())
            .await
            .map_err(node.contextual("realizations"))?;
        let tiers = priority_tiers(realizations);
        info!(
            package_id = node.id(),
            name = %self.definition.name,
            tiers = tiers.len(),
            "📦 Package started"
        );

        for tier in tiers {
            let mut pending = Vec::with_capacity(tier.len());
            for realization in tier {
                node.check_cancelled("dispatching realizations")?;
                let child = NodeCore::attach_child(
                    node,
                    NodeSpec::new(
                        Level::Realization,
                        realization.id,
                        realization.name.clone(),
                        realization.locked,
                    ),
                )?;
                let key = child.key();
                let handle = spawn_node(child, Arc::new(RealizationBehavior::new(realization)));
                pending.push((key, handle));
            }
            node.await_children(pending).await?;
        }
        Ok(())
    }
}

/// Obtain the completion handle of `package_id`, constructing the package
/// under `workflow` unless another requester already did
///
/// `known` skips the catalog lookup when the caller already holds the row.
pub async fn ensure_package(
    workflow: &Arc<NodeCore>,
    package_id: i64,
    known: Option<PackageDefinition>,
) -> Result<CompletionHandle> {
    let shared = workflow.shared().clone();
    loop {
        match shared.packages().claim(package_id) {
            Claim::Reuse(handle) => {
                debug!(package_id, "♻️ reusing package completion handle");
                return Ok(handle);
            }
            Claim::Wait => {
                shared
                    .poller()
                    .wait_until(workflow.cancel_token(), "package initialization", || {
                        !shared.packages().is_initializing(package_id)
                    })
                    .await?;
            }
            Claim::Construct => {
                return match construct_package(workflow, package_id, known).await {
                    Ok(handle) => {
                        shared
                            .packages()
                            .register(package_id, workflow.workflow_id(), handle.clone());
                        Ok(handle)
                    }
                    Err(e) => {
                        shared.packages().abandon(package_id);
                        Err(e)
                    }
                };
            }
        }
    }
}

async fn construct_package(
    workflow: &Arc<NodeCore>,
    package_id: i64,
    known: Option<PackageDefinition>,
) -> Result<CompletionHandle> {
    let definition = match known {
        Some(definition) => definition,
        None => workflow
            .shared()
            .catalog()
            .package(package_id)
            .await?
            .ok_or_else(|| OrchestratorError::Catalog(format!("unknown package {package_id}")))?,
    };

    let child = NodeCore::attach_child(
        workflow,
        NodeSpec::new(
            Level::Package,
            definition.id,
            definition.name.clone(),
            definition.locked,
        ),
    )?;
    Ok(spawn_node(child, Arc::new(PackageBehavior::new(definition))))
}
