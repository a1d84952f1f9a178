//! # Error Handling
//!
//! A single error taxonomy for the orchestration core:
//!
//! - **Fatal-to-operation** errors (counter underflow, duplicate table registration,
//!   queue or permit invariant violations) are raised with the originating operation
//!   and the run-id 4-tuple through [`OrchestratorError::WithContext`].
//! - **Not-implemented** signals for unsupported connector kinds stay distinguishable
//!   via [`OrchestratorError::is_not_implemented`].
//! - **Cancellation** is never a failure; callers route it through the error-path
//!   counter rollback and Abort. See [`OrchestratorError::is_cancellation`].

use crate::config::ConfigurationError;
use crate::constants::Level;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Log-correlation 4-tuple of run ids
///
/// Each entry is `None` until the node at that level has registered a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunContext {
    pub workflow_run_id: Option<i64>,
    pub package_run_id: Option<i64>,
    pub realization_run_id: Option<i64>,
    pub step_run_id: Option<i64>,
}

impl RunContext {
    /// Copy of this context with the run id for `level` set
    pub fn with_run(mut self, level: Level, run_id: i64) -> Self {
        match level {
            Level::Workflow => self.workflow_run_id = Some(run_id),
            Level::Package => self.package_run_id = Some(run_id),
            Level::Realization => self.realization_run_id = Some(run_id),
            Level::Step => self.step_run_id = Some(run_id),
        }
        self
    }

    pub fn run_id(&self, level: Level) -> Option<i64> {
        match level {
            Level::Workflow => self.workflow_run_id,
            Level::Package => self.package_run_id,
            Level::Realization => self.realization_run_id,
            Level::Step => self.step_run_id,
        }
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part(value: Option<i64>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "(workflow_run={}, package_run={}, realization_run={}, step_run={})",
            part(self.workflow_run_id),
            part(self.package_run_id),
            part(self.realization_run_id),
            part(self.step_run_id)
        )
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Counter underflow at {level} level: {counter} is already zero")]
    CounterUnderflow { level: Level, counter: &'static str },

    #[error("Unknown level: {0}")]
    UnknownLevel(String),

    #[error("Table {table} is already accessed")]
    DuplicateTable { table: String },

    #[error("Queue invariant violated on {queue}: {reason}")]
    QueueInvariant { queue: String, reason: String },

    #[error("Permit invariant violated at {level} level: {reason}")]
    PermitInvariant { level: Level, reason: String },

    #[error("Thread limit of {max} reached")]
    ThreadLimitExceeded { max: usize },

    #[error("Node {0} is already active")]
    NodeAlreadyActive(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Data mover error: {0}")]
    DataMover(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid lifecycle transition for workflow {workflow_id}: {from} on {event}")]
    StateTransition {
        workflow_id: i64,
        from: String,
        event: String,
    },

    #[error("Dependency package {package_id} did not finish: {reason}")]
    DependencyFailed { package_id: i64, reason: String },

    #[error("{level} {id} failed: {reason}")]
    ChildFailed { level: Level, id: i64, reason: String },

    #[error("{operation} failed {context}: {source}")]
    WithContext {
        operation: &'static str,
        context: RunContext,
        #[source]
        source: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    /// Wrap this error with the failing operation and its run context
    ///
    /// Already-wrapped errors keep their innermost context.
    pub fn with_context(self, operation: &'static str, context: RunContext) -> Self {
        match self {
            wrapped @ OrchestratorError::WithContext { .. } => wrapped,
            other => OrchestratorError::WithContext {
                operation,
                context,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through context wrappers
    pub fn root(&self) -> &OrchestratorError {
        match self {
            OrchestratorError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Run context attached to this error, if any
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            OrchestratorError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.root(), OrchestratorError::Cancelled(_))
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self.root(), OrchestratorError::NotImplemented(_))
    }

    pub fn is_thread_limit(&self) -> bool {
        matches!(self.root(), OrchestratorError::ThreadLimitExceeded { .. })
    }

    pub fn cancelled(waiting_for: impl Into<String>) -> Self {
        OrchestratorError::Cancelled(waiting_for.into())
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::Catalog(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Catalog(format!("invalid JSON payload: {err}"))
    }
}

impl From<ConfigurationError> for OrchestratorError {
    fn from(err: ConfigurationError) -> Self {
        OrchestratorError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
