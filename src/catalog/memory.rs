//! In-process catalog.
//!
//! Holds hierarchy definitions and the run log in memory. Used for embedded
//! runs and to drive the scheduler end to end in tests.

use super::Catalog;
use crate::constants::{Level, RunStatus};
use crate::error::{OrchestratorError, Result, RunContext};
use crate::models::{
    ConnectionInfo, PackageDefinition, PackageDependency, RealizationDefinition, StepDefinition,
    WorkflowDefinition, WorkflowParameters,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One run-log row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: i64,
    pub level: Level,
    pub node_id: i64,
    pub context: RunContext,
    pub status: RunStatus,
}

#[derive(Debug)]
struct WorkflowEntry {
    id: i64,
    name: String,
    locked: bool,
    active: bool,
    deactivation_reason: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    workflows: BTreeMap<i64, WorkflowEntry>,
    /// schedule_run_id → (workflow_id, status); `None` while pending
    schedule_runs: BTreeMap<i64, (i64, Option<RunStatus>)>,
    parameters: HashMap<i64, WorkflowParameters>,
    packages: Vec<PackageDefinition>,
    dependencies: Vec<PackageDependency>,
    realizations: Vec<RealizationDefinition>,
    steps: Vec<StepDefinition>,
    connections: HashMap<i64, ConnectionInfo>,
    runs: BTreeMap<i64, RunRecord>,
    next_run_id: i64,
    next_schedule_run_id: i64,
    broken_workflows: HashSet<i64>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workflow(&self, id: i64, name: &str, locked: bool) {
        self.state.lock().workflows.insert(
            id,
            WorkflowEntry {
                id,
                name: name.to_string(),
                locked,
                active: true,
                deactivation_reason: None,
            },
        );
    }

    /// Create a pending schedule run for `workflow_id`; returns its id
    pub fn schedule(&self, workflow_id: i64) -> i64 {
        let mut state = self.state.lock();
        state.next_schedule_run_id += 1;
        let schedule_run_id = state.next_schedule_run_id;
        state
            .schedule_runs
            .insert(schedule_run_id, (workflow_id, None));
        schedule_run_id
    }

    pub fn set_parameter(&self, workflow_id: i64, name: &str, value: &str) {
        let mut state = self.state.lock();
        let params = state.parameters.remove(&workflow_id).unwrap_or_default();
        state
            .parameters
            .insert(workflow_id, params.with(name, value));
    }

    pub fn add_package(&self, package: PackageDefinition) {
        self.state.lock().packages.push(package);
    }

    pub fn add_dependency(&self, package_id: i64, depends_on_package_id: i64) {
        self.state.lock().dependencies.push(PackageDependency {
            package_id,
            depends_on_package_id,
        });
    }

    pub fn add_realization(&self, realization: RealizationDefinition) {
        self.state.lock().realizations.push(realization);
    }

    pub fn add_step(&self, step: StepDefinition) {
        self.state.lock().steps.push(step);
    }

    pub fn add_connection(&self, connection: ConnectionInfo) {
        self.state.lock().connections.insert(connection.id, connection);
    }

    /// Make every hierarchy read for `workflow_id` fail
    pub fn break_workflow(&self, workflow_id: i64) {
        self.state.lock().broken_workflows.insert(workflow_id);
    }

    pub fn repair_workflow(&self, workflow_id: i64) {
        self.state.lock().broken_workflows.remove(&workflow_id);
    }

    pub fn is_workflow_active(&self, workflow_id: i64) -> bool {
        self.state
            .lock()
            .workflows
            .get(&workflow_id)
            .is_some_and(|w| w.active)
    }

    pub fn deactivation_reason(&self, workflow_id: i64) -> Option<String> {
        self.state
            .lock()
            .workflows
            .get(&workflow_id)
            .and_then(|w| w.deactivation_reason.clone())
    }

    pub fn schedule_status(&self, schedule_run_id: i64) -> Option<RunStatus> {
        self.state
            .lock()
            .schedule_runs
            .get(&schedule_run_id)
            .and_then(|(_, status)| *status)
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.state.lock().runs.values().cloned().collect()
    }

    /// Run-log rows of one node, oldest first
    pub fn runs_for(&self, level: Level, node_id: i64) -> Vec<RunRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|run| run.level == level && run.node_id == node_id)
            .cloned()
            .collect()
    }

    fn check_workflow(state: &MemoryState, workflow_id: i64) -> Result<()> {
        if state.broken_workflows.contains(&workflow_id) {
            return Err(OrchestratorError::Catalog(format!(
                "definition of workflow {workflow_id} is unreadable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn due_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        let state = self.state.lock();
        Ok(state
            .schedule_runs
            .iter()
            .filter(|(_, (_, status))| status.is_none())
            .filter_map(|(schedule_run_id, (workflow_id, _))| {
                state
                    .workflows
                    .get(workflow_id)
                    .filter(|w| w.active)
                    .map(|w| WorkflowDefinition {
                        id: w.id,
                        name: w.name.clone(),
                        locked: w.locked,
                        schedule_run_id: *schedule_run_id,
                    })
            })
            .collect())
    }

    async fn workflow_parameters(&self, workflow_id: i64) -> Result<WorkflowParameters> {
        let state = self.state.lock();
        Self::check_workflow(&state, workflow_id)?;
        Ok(state
            .parameters
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn packages(&self, workflow_id: i64) -> Result<Vec<PackageDefinition>> {
        let state = self.state.lock();
        Self::check_workflow(&state, workflow_id)?;
        let mut packages: Vec<_> = state
            .packages
            .iter()
            .filter(|p| p.workflow_id == workflow_id)
            .cloned()
            .collect();
        packages.sort_by_key(|p| (p.order, p.id));
        Ok(packages)
    }

    async fn package(&self, package_id: i64) -> Result<Option<PackageDefinition>> {
        Ok(self
            .state
            .lock()
            .packages
            .iter()
            .find(|p| p.id == package_id)
            .cloned())
    }

    async fn package_dependencies(&self, package_id: i64) -> Result<Vec<PackageDependency>> {
        Ok(self
            .state
            .lock()
            .dependencies
            .iter()
            .filter(|d| d.package_id == package_id)
            .copied()
            .collect())
    }

    async fn realizations(&self, package_id: i64) -> Result<Vec<RealizationDefinition>> {
        let mut realizations: Vec<_> = self
            .state
            .lock()
            .realizations
            .iter()
            .filter(|r| r.package_id == package_id)
            .cloned()
            .collect();
        realizations.sort_by_key(|r| (r.priority, r.id));
        Ok(realizations)
    }

    async fn steps(&self, realization_id: i64) -> Result<Vec<StepDefinition>> {
        let mut steps: Vec<_> = self
            .state
            .lock()
            .steps
            .iter()
            .filter(|s| s.realization_id == realization_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.sequence, s.id));
        Ok(steps)
    }

    async fn connection(&self, connection_id: i64) -> Result<Option<ConnectionInfo>> {
        Ok(self.state.lock().connections.get(&connection_id).cloned())
    }

    async fn mark_schedule_run(&self, schedule_run_id: i64, status: RunStatus) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.schedule_runs.get_mut(&schedule_run_id).ok_or_else(|| {
            OrchestratorError::Catalog(format!("unknown schedule run {schedule_run_id}"))
        })?;
        entry.1 = Some(status);
        Ok(())
    }

    async fn start_run(&self, level: Level, node_id: i64, context: &RunContext) -> Result<i64> {
        let mut state = self.state.lock();
        state.next_run_id += 1;
        let run_id = state.next_run_id;
        state.runs.insert(
            run_id,
            RunRecord {
                run_id,
                level,
                node_id,
                context: *context,
                status: RunStatus::Running,
            },
        );
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        _level: Level,
        run_id: i64,
        status: RunStatus,
        _context: &RunContext,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| OrchestratorError::Catalog(format!("unknown run {run_id}")))?;
        run.status = status;
        Ok(())
    }

    async fn deactivate_workflow(&self, workflow_id: i64, reason: &str) -> Result<()> {
        let mut state = self.state.lock();
        let workflow = state.workflows.get_mut(&workflow_id).ok_or_else(|| {
            OrchestratorError::Catalog(format!("unknown workflow {workflow_id}"))
        })?;
        workflow.active = false;
        workflow.deactivation_reason = Some(reason.to_string());
        Ok(())
    }
}
