//! Step level: the only level that moves data.
//!
//! A step is counted as executing only once every start condition holds at
//! the same time: the level admits it, its realization has a free parallel
//! slot, the global thread cap has room, it is first in the queue of every
//! table it touches, and none of those tables is currently accessed.
//!
//! Locked steps are the one exception to table FIFO order. A locked step
//! ignores its position in the table queues and only waits for its tables to
//! be free, so it can take a table ahead of a normal step that queued on it
//! earlier. Waiting for the queue head while holding the exclusive step permit
//! would deadlock against the normal steps ahead of it, which cannot be
//! admitted until the permit is returned.

use super::core::{NodeBehavior, NodeCore};
use super::realization::ParallelSlots;
use crate::concurrency::ResourceToken;
use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use crate::execution::{ConnectionHandle, StepRequest};
use crate::models::StepDefinition;
use crate::orchestration::SharedState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StepBehavior {
    definition: StepDefinition,
}

impl StepBehavior {
    pub fn new(definition: StepDefinition) -> Self {
        Self { definition }
    }

    async fn resolve_connection(
        shared: &SharedState,
        connection_id: Option<i64>,
    ) -> Result<Option<ConnectionHandle>> {
        let Some(connection_id) = connection_id else {
            return Ok(None);
        };
        let info = shared
            .catalog()
            .connection(connection_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::Catalog(format!("unknown connection {connection_id}"))
            })?;
        shared.connections().connect(&info).map(Some)
    }

    fn ready(shared: &SharedState, node: &NodeCore, slots: Option<&Arc<ParallelSlots>>) -> bool {
        let counters = shared.counters();
        // a locked step runs alone at its level once counted, so it only needs its tables free
        let queued_first =
            node.locked() || shared.run_queue().is_first_on_all(node.tables(), node.id());
        shared.level_lock().try_admit(Level::Step, node.locked())
            && slots.map_or(true, |slots| slots.has_room())
            && !counters.thread_limit_reached()
            && queued_first
            && !counters.any_table_accessed(node.tables())
    }

    /// Take a parallel slot, the level counters and a thread, retrying until all three hold
    async fn reserve(&self, node: &Arc<NodeCore>) -> Result<()> {
        let shared = node.shared().clone();
        let slots = node.parallel().cloned();
        loop {
            shared
                .poller()
                .wait_until(node.cancel_token(), "step start conditions", || {
                    Self::ready(&shared, node, slots.as_ref())
                })
                .await?;

            if let Some(slots) = &slots {
                if !slots.try_reserve() {
                    continue;
                }
                node.hold(ResourceToken::ParallelSlot);
            }

            node.increase_counters().await?;

            match shared.counters().increase_threads() {
                Ok(threads) => {
                    node.hold(ResourceToken::Thread);
                    debug!(step_id = node.id(), threads, "🧵 thread reserved");
                    return Ok(());
                }
                Err(e) if e.is_thread_limit() => {
                    debug!(step_id = node.id(), "thread cap reached, retrying");
                    node.release(ResourceToken::Counters)?;
                    node.release(ResourceToken::ParallelSlot)?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl NodeBehavior for StepBehavior {
    fn counts_at_admission(&self) -> bool {
        false
    }

    async fn start(&self, node: &Arc<NodeCore>) -> Result<()> {
        let shared = node.shared().clone();
        let source = Self::resolve_connection(&shared, self.definition.source_connection_id)
            .await
            .map_err(node.contextual("resolve_source_connection"))?;
        let destination =
            Self::resolve_connection(&shared, self.definition.destination_connection_id)
                .await
                .map_err(node.contextual("resolve_destination_connection"))?;

        self.reserve(node).await?;

        shared
            .counters()
            .add_accessed_tables(node.workflow_id(), node.tables())
            .map_err(node.contextual("add_accessed_tables"))?;
        node.hold(ResourceToken::TablesAccessed);
        node.release(ResourceToken::TablesQueued)
            .map_err(node.contextual("dequeue_tables"))?;

        info!(
            step_id = node.id(),
            kind = %self.definition.kind,
            tables = ?node.tables(),
            "▶️ Step moving data"
        );

        let request = StepRequest {
            step_id: node.id(),
            realization_id: self.definition.realization_id,
            workflow_id: node.workflow_id(),
            name: self.definition.name.clone(),
            kind: self.definition.kind,
            source,
            destination,
            tables: node.tables().to_vec(),
            payload: self.definition.payload.clone(),
            run_context: node.run_context(),
        };

        let report = tokio::select! {
            biased;
            _ = node.cancel_token().cancelled() => {
                return Err(OrchestratorError::cancelled("data movement"));
            }
            report = shared.mover().execute(&request, node.cancel_token()) => {
                report.map_err(node.contextual("data_mover"))?
            }
        };

        info!(
            step_id = node.id(),
            rows_moved = report.rows_moved,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "✅ Step data moved"
        );
        Ok(())
    }
}
