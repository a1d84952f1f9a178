//! Typed catalog over raw SQL.
//!
//! Schema (all tables prefixed `etl_`):
//!
//! - `etl_workflows(workflow_id, name, locked, active, deactivation_reason)`
//! - `etl_schedule_runs(schedule_run_id, workflow_id, status, scheduled_at)`
//! - `etl_workflow_parameters(workflow_id, name, value)`
//! - `etl_packages(package_id, workflow_id, name, locked, sort_order)`
//! - `etl_package_dependencies(package_id, depends_on_package_id)`
//! - `etl_realizations(realization_id, package_id, name, locked, priority, max_parallel_steps)`
//! - `etl_steps(step_id, realization_id, name, locked, sequence, kind, source_connection_id,
//!   destination_connection_id, source_tables, target_tables, payload)`
//! - `etl_connections(connection_id, name, backend, attributes)`
//! - `etl_run_log(run_id, level, node_id, workflow_run_id, package_run_id, realization_run_id,
//!   step_run_id, status, started_at, finished_at)`

use super::rows::CatalogRow;
use super::store::{int_or_null, quote_literal, CatalogStore};
use super::Catalog;
use crate::constants::{Level, RunStatus};
use crate::error::{OrchestratorError, Result, RunContext};
use crate::models::{
    ConnectionInfo, PackageDefinition, PackageDependency, RealizationDefinition, StepDefinition,
    WorkflowDefinition, WorkflowParameters,
};
use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug)]
pub struct SqlCatalog<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> SqlCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch<T>(&self, sql: &str) -> Result<Vec<T>>
    where
        T: for<'r> TryFrom<&'r CatalogRow, Error = OrchestratorError>,
    {
        let rows = self.store.query(sql).await?;
        rows.iter().map(|row| T::try_from(row)).collect()
    }

    async fn fetch_one<T>(&self, sql: &str) -> Result<Option<T>>
    where
        T: for<'r> TryFrom<&'r CatalogRow, Error = OrchestratorError>,
    {
        let rows = self.store.query(sql).await?;
        rows.first().map(|row| T::try_from(row)).transpose()
    }
}

#[async_trait]
impl<S: CatalogStore> Catalog for SqlCatalog<S> {
    async fn due_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        self.fetch(
            "SELECT w.workflow_id, w.name, w.locked, s.schedule_run_id \
             FROM etl_workflows w \
             JOIN etl_schedule_runs s ON s.workflow_id = w.workflow_id \
             WHERE w.active = TRUE AND s.status = 'pending' AND s.scheduled_at <= now() \
             ORDER BY s.scheduled_at, w.workflow_id",
        )
        .await
    }

    async fn workflow_parameters(&self, workflow_id: i64) -> Result<WorkflowParameters> {
        let rows = self
            .store
            .query(&format!(
                "SELECT name, value FROM etl_workflow_parameters WHERE workflow_id = {workflow_id}"
            ))
            .await?;
        WorkflowParameters::from_rows(&rows)
    }

    async fn packages(&self, workflow_id: i64) -> Result<Vec<PackageDefinition>> {
        self.fetch(&format!(
            "SELECT package_id, workflow_id, name, locked, sort_order \
             FROM etl_packages WHERE workflow_id = {workflow_id} \
             ORDER BY sort_order, package_id"
        ))
        .await
    }

    async fn package(&self, package_id: i64) -> Result<Option<PackageDefinition>> {
        self.fetch_one(&format!(
            "SELECT package_id, workflow_id, name, locked, sort_order \
             FROM etl_packages WHERE package_id = {package_id}"
        ))
        .await
    }

    async fn package_dependencies(&self, package_id: i64) -> Result<Vec<PackageDependency>> {
        self.fetch(&format!(
            "SELECT package_id, depends_on_package_id \
             FROM etl_package_dependencies WHERE package_id = {package_id} \
             ORDER BY depends_on_package_id"
        ))
        .await
    }

    async fn realizations(&self, package_id: i64) -> Result<Vec<RealizationDefinition>> {
        self.fetch(&format!(
            "SELECT realization_id, package_id, name, locked, priority, max_parallel_steps \
             FROM etl_realizations WHERE package_id = {package_id} \
             ORDER BY priority, realization_id"
        ))
        .await
    }

    async fn steps(&self, realization_id: i64) -> Result<Vec<StepDefinition>> {
        self.fetch(&format!(
            "SELECT step_id, realization_id, name, locked, sequence, kind, \
             source_connection_id, destination_connection_id, source_tables, target_tables, payload \
             FROM etl_steps WHERE realization_id = {realization_id} \
             ORDER BY sequence, step_id"
        ))
        .await
    }

    async fn connection(&self, connection_id: i64) -> Result<Option<ConnectionInfo>> {
        self.fetch_one(&format!(
            "SELECT connection_id, name, backend, attributes \
             FROM etl_connections WHERE connection_id = {connection_id}"
        ))
        .await
    }

    async fn mark_schedule_run(&self, schedule_run_id: i64, status: RunStatus) -> Result<()> {
        self.store
            .execute(&format!(
                "UPDATE etl_schedule_runs SET status = {} WHERE schedule_run_id = {schedule_run_id}",
                quote_literal(status.as_str())
            ))
            .await?;
        Ok(())
    }

    async fn start_run(&self, level: Level, node_id: i64, context: &RunContext) -> Result<i64> {
        let rows = self
            .store
            .query(&format!(
                "INSERT INTO etl_run_log \
                 (level, node_id, workflow_run_id, package_run_id, realization_run_id, step_run_id, status, started_at) \
                 VALUES ({}, {node_id}, {}, {}, {}, {}, {}, now()) RETURNING run_id",
                quote_literal(level.as_str()),
                int_or_null(context.workflow_run_id),
                int_or_null(context.package_run_id),
                int_or_null(context.realization_run_id),
                int_or_null(context.step_run_id),
                quote_literal(RunStatus::Running.as_str()),
            ))
            .await?;
        let run_id = rows
            .first()
            .ok_or_else(|| OrchestratorError::Catalog("run log insert returned no row".to_string()))?
            .get_i64("run_id")?;
        debug!(level = %level, node_id, run_id, context = %context, "run registered");
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        level: Level,
        run_id: i64,
        status: RunStatus,
        context: &RunContext,
    ) -> Result<()> {
        self.store
            .execute(&format!(
                "UPDATE etl_run_log SET status = {}, finished_at = now() WHERE run_id = {run_id}",
                quote_literal(status.as_str())
            ))
            .await?;
        debug!(level = %level, run_id, status = %status, context = %context, "run closed");
        Ok(())
    }

    async fn deactivate_workflow(&self, workflow_id: i64, reason: &str) -> Result<()> {
        self.store
            .execute(&format!(
                "UPDATE etl_workflows SET active = FALSE, deactivation_reason = {} \
                 WHERE workflow_id = {workflow_id}",
                quote_literal(reason)
            ))
            .await?;
        info!(workflow_id, reason = %reason, "🚫 workflow deactivated in catalog");
        Ok(())
    }
}
