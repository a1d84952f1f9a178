//! Realization level: runs its steps in catalog sequence under a parallel-step cap.

use super::core::{spawn_node, NodeBehavior, NodeCore, NodeSpec};
use super::completion::NodeOutcome;
use super::step::StepBehavior;
use crate::concurrency::ResourceToken;
use crate::constants::Level;
use crate::error::Result;
use crate::models::{resolve_tables, RealizationDefinition, StepDefinition};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Cap on steps of one realization running at once
#[derive(Debug)]
pub struct ParallelSlots {
    max: usize,
    running: Mutex<usize>,
}

impl ParallelSlots {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            running: Mutex::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn running(&self) -> usize {
        *self.running.lock()
    }

    pub fn has_room(&self) -> bool {
        *self.running.lock() < self.max
    }

    pub fn try_reserve(&self) -> bool {
        let mut running = self.running.lock();
        if *running >= self.max {
            return false;
        }
        *running += 1;
        true
    }

    pub fn release(&self) {
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
pub struct RealizationBehavior {
    definition: RealizationDefinition,
}

impl RealizationBehavior {
    pub fn new(definition: RealizationDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl NodeBehavior for RealizationBehavior {
    async fn start(&self, node: &Arc<NodeCore>) -> Result<()> {
        let shared = node.shared().clone();
        let steps = shared
            .catalog()
            .steps(node.id())
            .await
            .map_err(node.contextual("steps"))?;

        // every placeholder must resolve before any step queues on a table
        let resolved = steps
            .into_iter()
            .map(|step| {
                let tables = resolve_tables(&step.tables(), node.parameters())?;
                Ok((step, tables))
            })
            .collect::<Result<Vec<(StepDefinition, Vec<String>)>>>()
            .map_err(node.contextual("resolve_tables"))?;

        let slots = Arc::new(ParallelSlots::new(self.definition.max_parallel_steps));
        info!(
            realization_id = node.id(),
            steps = resolved.len(),
            max_parallel_steps = slots.max(),
            "🧩 Realization started"
        );

        let mut pending = Vec::with_capacity(resolved.len());
        for (step, tables) in resolved {
            node.check_cancelled("dispatching steps")?;
            let child = NodeCore::attach_child(
                node,
                NodeSpec::new(Level::Step, step.id, step.name.clone(), step.locked)
                    .with_tables(tables)
                    .with_parallel(slots.clone()),
            )?;

            if let Err(e) = shared.run_queue().enqueue_tables(child.tables(), child.id()) {
                child
                    .abort_cleanup(NodeOutcome::Failed(e.to_string()))
                    .await;
                return Err(e.with_context("enqueue_tables", node.run_context()));
            }
            child.hold(ResourceToken::TablesQueued);

            let key = child.key();
            pending.push((key, spawn_node(child, Arc::new(StepBehavior::new(step)))));
        }

        node.await_children(pending).await
    }
}
