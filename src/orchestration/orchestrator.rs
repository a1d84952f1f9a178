//! # Orchestrator
//!
//! Promotes due catalog workflows into running workflow nodes. Each scan reaps
//! finished runs, reads the due schedule runs and launches every workflow not
//! already active. A workflow whose hierarchy cannot even be read counts a
//! construction failure; after `max_construct_failures` consecutive ones it is
//! deactivated in the catalog and the operator is notified.

use super::shared::SharedState;
use crate::catalog::Catalog;
use crate::config::OrchestratorConfig;
use crate::constants::{events, RunStatus};
use crate::error::{OrchestratorError, Result};
use crate::events::LogNotifier;
use crate::execution::DataMover;
use crate::models::WorkflowDefinition;
use crate::nodes::{spawn_node, NodeCore, NodeKey, NodeOutcome, NodeSpec, WorkflowBehavior};
use crate::state_machine::WorkflowEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Result of one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub due: usize,
    pub started: usize,
    pub skipped: usize,
    pub construct_failures: usize,
    pub deactivated: usize,
    pub reaped: usize,
}

#[derive(Debug)]
enum Launch {
    Started(Arc<NodeCore>),
    Skipped,
    ConstructFailed {
        error: OrchestratorError,
        deactivated: bool,
    },
}

#[derive(Debug)]
struct RunningWorkflow {
    node: Arc<NodeCore>,
    task: JoinHandle<NodeOutcome>,
}

#[derive(Debug)]
pub struct Orchestrator {
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
    running: Mutex<HashMap<i64, RunningWorkflow>>,
    construct_failures: Mutex<HashMap<i64, u32>>,
}

impl Orchestrator {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self {
            shared,
            shutdown: CancellationToken::new(),
            running: Mutex::new(HashMap::new()),
            construct_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Wire shared state from configuration and the two required collaborators
    pub fn from_config(
        config: &OrchestratorConfig,
        catalog: Arc<dyn Catalog>,
        mover: Arc<dyn DataMover>,
    ) -> Self {
        let shared = SharedState::builder(config.scheduler.clone(), catalog, mover)
            .notifier(Arc::new(LogNotifier::new(&config.notification)))
            .build();
        Self::new(shared)
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_running(&self, workflow_id: i64) -> bool {
        self.running.lock().contains_key(&workflow_id)
    }

    pub fn running_workflows(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.running.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Consecutive construction failures recorded for `workflow_id`
    pub fn construct_failures(&self, workflow_id: i64) -> u32 {
        self.construct_failures
            .lock()
            .get(&workflow_id)
            .copied()
            .unwrap_or(0)
    }

    /// Scan until `shutdown` is called
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        let scan_interval = self.shared.scheduler().scan_interval();
        info!(
            scan_interval_ms = scan_interval.as_millis() as u64,
            max_threads = self.shared.scheduler().max_threads,
            "🚀 Orchestrator scan loop started"
        );

        let mut ticker = tokio::time::interval(scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.scan_once().await {
                Ok(summary) if summary.started > 0 || summary.construct_failures > 0 => {
                    info!(?summary, "🔍 Scan completed");
                }
                Ok(summary) => debug!(?summary, "scan completed"),
                Err(e) => error!(error = %e, "Scan failed; retrying next interval"),
            }
        }

        info!("🛑 Orchestrator scan loop stopped");
        Ok(())
    }

    /// One pass: reap finished runs, then launch every due workflow not already active
    pub async fn scan_once(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary {
            reaped: self.reap_finished().await,
            ..ScanSummary::default()
        };
        if self.shutdown.is_cancelled() {
            return Ok(summary);
        }

        let due = self.shared.catalog().due_workflows().await?;
        summary.due = due.len();
        for definition in due {
            match self.launch(definition).await {
                Launch::Started(_) => summary.started += 1,
                Launch::Skipped => summary.skipped += 1,
                Launch::ConstructFailed { deactivated, .. } => {
                    summary.construct_failures += 1;
                    if deactivated {
                        summary.deactivated += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Launch one workflow run outside the scan
    pub async fn start_workflow(&self, definition: WorkflowDefinition) -> Result<Arc<NodeCore>> {
        let workflow_id = definition.id;
        match self.launch(definition).await {
            Launch::Started(node) => Ok(node),
            Launch::Skipped => Err(OrchestratorError::NodeAlreadyActive(
                NodeKey::workflow(workflow_id).to_string(),
            )),
            Launch::ConstructFailed { error, .. } => Err(error),
        }
    }

    /// Wait for a launched workflow run and its bookkeeping to complete
    pub async fn wait_for_workflow(&self, workflow_id: i64) -> Option<NodeOutcome> {
        let running = self.running.lock().remove(&workflow_id)?;
        Some(Self::join(workflow_id, running.task).await)
    }

    /// Abort a running workflow and wait until its whole subtree has unwound
    pub async fn abort_workflow(&self, workflow_id: i64) -> Option<NodeOutcome> {
        let node = self
            .running
            .lock()
            .get(&workflow_id)
            .map(|running| running.node.clone())?;
        info!(workflow_id, "🛑 Aborting workflow");
        node.abort().await;
        self.wait_for_workflow(workflow_id).await
    }

    /// Cancel every workflow scope and wait for the in-flight runs; returns how many were running
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        let running: Vec<(i64, RunningWorkflow)> = self.running.lock().drain().collect();
        let count = running.len();
        for (workflow_id, workflow) in running {
            Self::join(workflow_id, workflow.task).await;
        }
        info!(workflows = count, "Orchestrator shut down");
        count
    }

    async fn join(workflow_id: i64, task: JoinHandle<NodeOutcome>) -> NodeOutcome {
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(workflow_id, error = %e, "workflow supervisor ended abnormally");
                NodeOutcome::Failed(format!("workflow supervisor ended abnormally: {e}"))
            }
        }
    }

    async fn reap_finished(&self) -> usize {
        let finished: Vec<(i64, RunningWorkflow)> = {
            let mut running = self.running.lock();
            let ids: Vec<i64> = running
                .iter()
                .filter(|(_, workflow)| workflow.task.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| running.remove(&id).map(|workflow| (id, workflow)))
                .collect()
        };
        let count = finished.len();
        for (workflow_id, workflow) in finished {
            let outcome = Self::join(workflow_id, workflow.task).await;
            debug!(workflow_id, outcome = %outcome, "workflow run reaped");
        }
        count
    }

    async fn launch(&self, definition: WorkflowDefinition) -> Launch {
        let workflow_id = definition.id;
        let lifecycle = self.shared.lifecycle();
        if self.is_running(workflow_id) || lifecycle.is_active(workflow_id) {
            debug!(workflow_id, "workflow already active, skipping");
            return Launch::Skipped;
        }

        let scheduled = lifecycle
            .transition(
                workflow_id,
                WorkflowEvent::Schedule {
                    schedule_run_id: definition.schedule_run_id,
                },
            )
            .and_then(|_| lifecycle.transition(workflow_id, WorkflowEvent::BeginInit));
        if let Err(e) = scheduled {
            warn!(workflow_id, error = %e, "workflow could not be scheduled");
            return Launch::Skipped;
        }

        let node = match self.construct(&definition).await {
            Ok(node) => node,
            Err(error) => {
                let deactivated = self.record_construct_failure(&definition, &error).await;
                return Launch::ConstructFailed { error, deactivated };
            }
        };
        self.construct_failures.lock().remove(&workflow_id);

        let task = tokio::spawn(supervise(self.shared.clone(), definition, node.clone()));
        self.running.lock().insert(
            workflow_id,
            RunningWorkflow {
                node: node.clone(),
                task,
            },
        );
        Launch::Started(node)
    }

    async fn construct(&self, definition: &WorkflowDefinition) -> Result<Arc<NodeCore>> {
        let catalog = self.shared.catalog();
        catalog
            .mark_schedule_run(definition.schedule_run_id, RunStatus::Running)
            .await?;
        let parameters = catalog.workflow_parameters(definition.id).await?;
        let packages = catalog.packages(definition.id).await?;

        let node = NodeCore::root(
            self.shared.clone(),
            NodeSpec::new(
                crate::constants::Level::Workflow,
                definition.id,
                definition.name.clone(),
                definition.locked,
            ),
            parameters,
            &self.shutdown,
        )?;
        info!(
            workflow_id = definition.id,
            name = %definition.name,
            packages = packages.len(),
            "📋 Workflow constructed"
        );
        spawn_node(node.clone(), Arc::new(WorkflowBehavior::new(packages)));
        Ok(node)
    }

    /// Count a construction failure; returns whether the workflow got deactivated
    async fn record_construct_failure(
        &self,
        definition: &WorkflowDefinition,
        error: &OrchestratorError,
    ) -> bool {
        let workflow_id = definition.id;
        let shared = &self.shared;
        if let Err(e) = shared
            .lifecycle()
            .transition(workflow_id, WorkflowEvent::fail_with_error(error.to_string()))
        {
            warn!(workflow_id, error = %e, "lifecycle could not record construction failure");
        }
        if let Err(e) = shared
            .catalog()
            .mark_schedule_run(definition.schedule_run_id, RunStatus::Failed)
            .await
        {
            warn!(workflow_id, error = %e, "schedule run could not be marked failed");
        }

        let failures = {
            let mut counts = self.construct_failures.lock();
            let count = counts.entry(workflow_id).or_insert(0);
            *count += 1;
            *count
        };
        let threshold = shared.scheduler().max_construct_failures;
        warn!(
            workflow_id,
            failures,
            threshold,
            error = %error,
            "⚠️ Workflow construction failed"
        );
        if failures < threshold {
            return false;
        }

        let reason = format!("construction failed {failures} times in a row: {error}");
        if let Err(e) = shared
            .catalog()
            .deactivate_workflow(workflow_id, &reason)
            .await
        {
            error!(workflow_id, error = %e, "workflow could not be deactivated");
            return false;
        }
        self.construct_failures.lock().remove(&workflow_id);
        shared.notifier().notify(
            &format!("Workflow {} ({workflow_id}) deactivated", definition.name),
            &reason,
        );
        shared.events().publish(
            events::WORKFLOW_DEACTIVATED,
            json!({ "workflow_id": workflow_id, "reason": reason }),
        );
        true
    }
}

/// Wait for a workflow node, then record its outcome in the lifecycle registry and catalog
async fn supervise(
    shared: Arc<SharedState>,
    definition: WorkflowDefinition,
    node: Arc<NodeCore>,
) -> NodeOutcome {
    let workflow_id = definition.id;
    let outcome = node.completion().wait().await;

    let event = match &outcome {
        NodeOutcome::Finished => WorkflowEvent::Finish,
        other => WorkflowEvent::fail_with_error(other.to_string()),
    };
    if let Err(e) = shared.lifecycle().transition(workflow_id, event) {
        warn!(workflow_id, error = %e, "lifecycle transition after run failed");
    }
    if let Err(e) = shared
        .catalog()
        .mark_schedule_run(definition.schedule_run_id, outcome.run_status())
        .await
    {
        warn!(workflow_id, error = %e, "schedule run status could not be written");
    }
    let released = shared.packages().release_workflow(workflow_id);

    match &outcome {
        NodeOutcome::Finished => {
            info!(workflow_id, released, "🏁 Workflow finished");
        }
        other => {
            error!(workflow_id, outcome = %other, "❌ Workflow did not finish");
            shared.notifier().notify(
                &format!("Workflow {} ({workflow_id}) {}", definition.name, other.run_status()),
                &other.to_string(),
            );
        }
    }
    outcome
}
