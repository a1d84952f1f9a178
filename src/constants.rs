//! # System Constants
//!
//! Hierarchy levels, lifecycle event names and scheduler defaults that define the
//! operational boundaries of the orchestration engine.
//!
//! The four hierarchy levels are strictly ordered: a [`Level::Workflow`] owns
//! packages, a package owns realizations and a realization owns steps. Every
//! per-level structure in the concurrency core is indexed through [`Level::index`].

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One level of the Workflow → Package → Realization → Step hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Workflow,
    Package,
    Realization,
    Step,
}

impl Level {
    /// All levels, outermost first
    pub const ALL: [Level; 4] = [
        Level::Workflow,
        Level::Package,
        Level::Realization,
        Level::Step,
    ];

    /// Number of hierarchy levels
    pub const COUNT: usize = 4;

    /// Stable index used by per-level arrays
    pub const fn index(self) -> usize {
        match self {
            Level::Workflow => 0,
            Level::Package => 1,
            Level::Realization => 2,
            Level::Step => 3,
        }
    }

    /// The level directly beneath this one, if any
    pub const fn child(self) -> Option<Level> {
        match self {
            Level::Workflow => Some(Level::Package),
            Level::Package => Some(Level::Realization),
            Level::Realization => Some(Level::Step),
            Level::Step => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Workflow => "workflow",
            Level::Package => "package",
            Level::Realization => "realization",
            Level::Step => "step",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workflow" => Ok(Level::Workflow),
            "package" => Ok(Level::Package),
            "realization" => Ok(Level::Realization),
            "step" => Ok(Level::Step),
            other => Err(OrchestratorError::UnknownLevel(other.to_string())),
        }
    }
}

impl TryFrom<i64> for Level {
    type Error = OrchestratorError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Level::Workflow),
            1 => Ok(Level::Package),
            2 => Ok(Level::Realization),
            3 => Ok(Level::Step),
            other => Err(OrchestratorError::UnknownLevel(other.to_string())),
        }
    }
}

/// Final status written to the catalog run log for one node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
    Aborted,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events published on the [`crate::events::EventPublisher`]
pub mod events {
    // Node lifecycle events
    pub const NODE_INIT_STARTED: &str = "node.init_started";
    pub const NODE_ADMITTED: &str = "node.admitted";
    pub const NODE_STARTED: &str = "node.started";
    pub const NODE_FINISHED: &str = "node.finished";
    pub const NODE_ABORTED: &str = "node.aborted";
    pub const NODE_FAILED: &str = "node.failed";

    // Workflow lifecycle events
    pub const WORKFLOW_SCHEDULED: &str = "workflow.scheduled";
    pub const WORKFLOW_EXECUTING: &str = "workflow.executing";
    pub const WORKFLOW_FINISHED: &str = "workflow.finished";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_DEACTIVATED: &str = "workflow.deactivated";
}

/// Scheduler defaults used when configuration omits a value
pub mod defaults {
    /// Interval between re-checks of queue positions and start conditions
    pub const POLL_INTERVAL_MS: u64 = 250;
    /// Interval between catalog scans for due workflows
    pub const SCAN_INTERVAL_MS: u64 = 30_000;
    /// Global cap on concurrently executing steps
    pub const MAX_THREADS: usize = 8;
    /// Consecutive construction failures before a workflow is deactivated
    pub const MAX_CONSTRUCT_FAILURES: u32 = 3;
    /// Parallel step cap applied when a realization row does not carry one
    pub const MAX_PARALLEL_STEPS: usize = 1;
    /// Capacity of the lifecycle event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}
