//! # Workflow Lifecycle Registry
//!
//! Tracks which lifecycle state every known workflow is in, the catalog schedule
//! run each workflow was last scheduled under, and the append-only set of
//! workflows that have run at least once.
//!
//! A workflow sits in exactly one state set, with one exception: failing a
//! workflow that already reached `Finished` adds it to `Failed` without taking
//! it out of `Finished`. Both memberships stay until the next `Schedule`.

use super::events::WorkflowEvent;
use super::states::WorkflowState;
use crate::constants::events;
use crate::error::{OrchestratorError, Result};
use crate::events::EventPublisher;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Registry {
    members: HashMap<WorkflowState, HashSet<i64>>,
    latest: HashMap<i64, WorkflowState>,
    schedule_runs: HashMap<i64, i64>,
    executed_once: BTreeSet<i64>,
}

impl Registry {
    fn insert(&mut self, state: WorkflowState, workflow_id: i64) {
        self.members.entry(state).or_default().insert(workflow_id);
    }

    fn remove(&mut self, state: WorkflowState, workflow_id: i64) {
        if let Some(set) = self.members.get_mut(&state) {
            set.remove(&workflow_id);
        }
    }

    fn contains(&self, state: WorkflowState, workflow_id: i64) -> bool {
        self.members
            .get(&state)
            .is_some_and(|set| set.contains(&workflow_id))
    }
}

#[derive(Debug)]
pub struct LifecycleRegistry {
    inner: Mutex<Registry>,
    publisher: EventPublisher,
}

impl LifecycleRegistry {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
            publisher,
        }
    }

    /// Apply `event` to `workflow_id` and return the new state
    pub fn transition(&self, workflow_id: i64, event: WorkflowEvent) -> Result<WorkflowState> {
        let (from, target) = {
            let mut registry = self.inner.lock();
            let from = registry.latest.get(&workflow_id).copied();
            let target = Self::determine_target_state(workflow_id, from, &event)?;

            match (&event, from) {
                // Finished stays recorded alongside Failed
                (WorkflowEvent::Fail(_), Some(WorkflowState::Finished)) => {}
                (WorkflowEvent::Schedule { .. }, _) => {
                    registry.remove(WorkflowState::Finished, workflow_id);
                    registry.remove(WorkflowState::Failed, workflow_id);
                    registry.remove(WorkflowState::Scheduled, workflow_id);
                }
                (_, Some(previous)) => registry.remove(previous, workflow_id),
                (_, None) => {}
            }
            registry.insert(target, workflow_id);
            registry.latest.insert(workflow_id, target);

            match &event {
                WorkflowEvent::Schedule { schedule_run_id } => {
                    registry.schedule_runs.insert(workflow_id, *schedule_run_id);
                }
                WorkflowEvent::Finish | WorkflowEvent::Fail(_) => {
                    registry.executed_once.insert(workflow_id);
                }
                _ => {}
            }
            (from, target)
        };

        debug!(
            workflow_id,
            from = ?from,
            to = %target,
            event = event.event_type(),
            "workflow lifecycle transition"
        );
        self.publish(workflow_id, target, &event);
        Ok(target)
    }

    fn determine_target_state(
        workflow_id: i64,
        current: Option<WorkflowState>,
        event: &WorkflowEvent,
    ) -> Result<WorkflowState> {
        let target = match (current, event) {
            // Schedule transitions
            (None, WorkflowEvent::Schedule { .. }) => WorkflowState::Scheduled,
            (Some(WorkflowState::Scheduled), WorkflowEvent::Schedule { .. }) => {
                WorkflowState::Scheduled
            }
            (Some(WorkflowState::Finished), WorkflowEvent::Schedule { .. }) => {
                WorkflowState::Scheduled
            }
            (Some(WorkflowState::Failed), WorkflowEvent::Schedule { .. }) => {
                WorkflowState::Scheduled
            }

            // Run transitions
            (Some(WorkflowState::Scheduled), WorkflowEvent::BeginInit) => {
                WorkflowState::Initializing
            }
            (Some(WorkflowState::Initializing), WorkflowEvent::BeginExecution) => {
                WorkflowState::Executing
            }
            (Some(WorkflowState::Executing), WorkflowEvent::Finish) => WorkflowState::Finished,

            // Failure transitions
            (Some(WorkflowState::Scheduled), WorkflowEvent::Fail(_)) => WorkflowState::Failed,
            (Some(WorkflowState::Initializing), WorkflowEvent::Fail(_)) => WorkflowState::Failed,
            (Some(WorkflowState::Executing), WorkflowEvent::Fail(_)) => WorkflowState::Failed,
            (Some(WorkflowState::Finished), WorkflowEvent::Fail(_)) => {
                warn!(workflow_id, "failing a workflow that already finished");
                WorkflowState::Failed
            }

            // Invalid transitions
            (from, _) => {
                return Err(OrchestratorError::StateTransition {
                    workflow_id,
                    from: from.map_or_else(|| "untracked".to_string(), |s| s.to_string()),
                    event: event.event_type().to_string(),
                })
            }
        };
        Ok(target)
    }

    fn publish(&self, workflow_id: i64, target: WorkflowState, event: &WorkflowEvent) {
        let name = match target {
            WorkflowState::Scheduled => events::WORKFLOW_SCHEDULED,
            WorkflowState::Executing => events::WORKFLOW_EXECUTING,
            WorkflowState::Finished => events::WORKFLOW_FINISHED,
            WorkflowState::Failed => events::WORKFLOW_FAILED,
            WorkflowState::Initializing => return,
        };
        if target == WorkflowState::Failed {
            info!(workflow_id, reason = ?event.error_message(), "❌ workflow failed");
        }
        self.publisher.publish(
            name,
            json!({
                "workflow_id": workflow_id,
                "state": target.to_string(),
                "reason": event.error_message(),
            }),
        );
    }

    /// Most recent state of `workflow_id`
    pub fn current_state(&self, workflow_id: i64) -> Option<WorkflowState> {
        self.inner.lock().latest.get(&workflow_id).copied()
    }

    /// Whether `workflow_id` is a member of `state`'s set
    pub fn is_in(&self, workflow_id: i64, state: WorkflowState) -> bool {
        self.inner.lock().contains(state, workflow_id)
    }

    /// Whether a run of `workflow_id` is in flight
    pub fn is_active(&self, workflow_id: i64) -> bool {
        self.current_state(workflow_id)
            .is_some_and(|state| state.is_active())
    }

    pub fn workflows_in(&self, state: WorkflowState) -> Vec<i64> {
        let registry = self.inner.lock();
        let mut ids: Vec<i64> = registry
            .members
            .get(&state)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn schedule_run_id(&self, workflow_id: i64) -> Option<i64> {
        self.inner.lock().schedule_runs.get(&workflow_id).copied()
    }

    pub fn has_executed_once(&self, workflow_id: i64) -> bool {
        self.inner.lock().executed_once.contains(&workflow_id)
    }

    pub fn executed_once(&self) -> Vec<i64> {
        self.inner.lock().executed_once.iter().copied().collect()
    }
}
