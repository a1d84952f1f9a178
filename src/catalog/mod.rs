//! # Catalog Boundary
//!
//! The relational catalog holds hierarchy definitions, package dependencies,
//! connection attributes, schedule runs and the run log keyed by the run-id
//! 4-tuple.
//!
//! [`Catalog`] is the typed view the scheduler consumes. [`SqlCatalog`] derives
//! it from any raw [`CatalogStore`]; [`PgCatalogStore`] is the PostgreSQL store
//! and [`MemoryCatalog`] keeps everything in process.

pub mod memory;
pub mod postgres;
pub mod rows;
pub mod sql;
pub mod store;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalogStore;
pub use rows::{CatalogRow, CatalogValue};
pub use sql::SqlCatalog;
pub use store::CatalogStore;

use crate::constants::{Level, RunStatus};
use crate::error::{Result, RunContext};
use crate::models::{
    ConnectionInfo, PackageDefinition, PackageDependency, RealizationDefinition, StepDefinition,
    WorkflowDefinition, WorkflowParameters,
};
use async_trait::async_trait;
use std::fmt::Debug;

#[async_trait]
pub trait Catalog: Send + Sync + Debug {
    /// Active workflows with a pending schedule run that is due
    async fn due_workflows(&self) -> Result<Vec<WorkflowDefinition>>;

    async fn workflow_parameters(&self, workflow_id: i64) -> Result<WorkflowParameters>;

    /// Packages of a workflow in catalog order
    async fn packages(&self, workflow_id: i64) -> Result<Vec<PackageDefinition>>;

    async fn package(&self, package_id: i64) -> Result<Option<PackageDefinition>>;

    /// Packages `package_id` waits for
    async fn package_dependencies(&self, package_id: i64) -> Result<Vec<PackageDependency>>;

    async fn realizations(&self, package_id: i64) -> Result<Vec<RealizationDefinition>>;

    /// Steps of a realization in sequence order
    async fn steps(&self, realization_id: i64) -> Result<Vec<StepDefinition>>;

    async fn connection(&self, connection_id: i64) -> Result<Option<ConnectionInfo>>;

    /// Record a schedule run's progress
    async fn mark_schedule_run(&self, schedule_run_id: i64, status: RunStatus) -> Result<()>;

    /// Open a run-log row for one node execution and return its run id
    async fn start_run(&self, level: Level, node_id: i64, context: &RunContext) -> Result<i64>;

    /// Close a run-log row with its final status
    async fn finish_run(
        &self,
        level: Level,
        run_id: i64,
        status: RunStatus,
        context: &RunContext,
    ) -> Result<()>;

    /// Stop scheduling a workflow
    async fn deactivate_workflow(&self, workflow_id: i64, reason: &str) -> Result<()>;
}
