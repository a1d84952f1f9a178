use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Due in the catalog and picked up by a scan
    Scheduled,
    /// Admission and package construction in progress
    Initializing,
    /// Packages are running
    Executing,
    /// The last run failed or was aborted
    Failed,
    /// The last run completed
    Finished,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 5] = [
        WorkflowState::Scheduled,
        WorkflowState::Initializing,
        WorkflowState::Executing,
        WorkflowState::Failed,
        WorkflowState::Finished,
    ];

    /// Check if this is a terminal state for one run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Finished)
    }

    /// Check if a run is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::Executing)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Initializing => write!(f, "initializing"),
            Self::Executing => write!(f, "executing"),
            Self::Failed => write!(f, "failed"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "initializing" => Ok(Self::Initializing),
            "executing" => Ok(Self::Executing),
            "failed" => Ok(Self::Failed),
            "finished" => Ok(Self::Finished),
            _ => Err(format!("Invalid workflow state: {s}")),
        }
    }
}
