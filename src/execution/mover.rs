//! Data mover boundary.
//!
//! The data mover executes one step's payload between its resolved
//! connections. Copy and transform logic lives behind [`DataMover`]; the
//! scheduler only guarantees that a step holds its tables, its thread and its
//! level admission while `execute` runs.

use super::connection::ConnectionHandle;
use crate::error::{OrchestratorError, Result, RunContext};
use crate::models::StepKind;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a data mover needs to run one step
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub step_id: i64,
    pub realization_id: i64,
    pub workflow_id: i64,
    pub name: String,
    pub kind: StepKind,
    pub source: Option<ConnectionHandle>,
    pub destination: Option<ConnectionHandle>,
    /// Resolved tables the step holds while it runs
    pub tables: Vec<String>,
    pub payload: Value,
    pub run_context: RunContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub rows_moved: u64,
    pub elapsed: Duration,
}

#[async_trait]
pub trait DataMover: Send + Sync + Debug {
    /// Run the step; implementations should stop early when `cancel` fires
    async fn execute(&self, request: &StepRequest, cancel: &CancellationToken)
        -> Result<MoveReport>;
}

/// Logs each step instead of moving data
#[derive(Debug, Clone, Default)]
pub struct DryRunDataMover {
    delay: Duration,
}

impl DryRunDataMover {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DataMover for DryRunDataMover {
    async fn execute(
        &self,
        request: &StepRequest,
        cancel: &CancellationToken,
    ) -> Result<MoveReport> {
        info!(
            step_id = request.step_id,
            kind = %request.kind,
            source = request.source.as_ref().map(|c| c.describe()),
            destination = request.destination.as_ref().map(|c| c.describe()),
            tables = ?request.tables,
            context = %request.run_context,
            "🧪 dry run step"
        );
        tokio::select! {
            _ = cancel.cancelled() => Err(OrchestratorError::cancelled("dry run step")),
            _ = tokio::time::sleep(self.delay) => Ok(MoveReport {
                rows_moved: 0,
                elapsed: self.delay,
            }),
        }
    }
}
