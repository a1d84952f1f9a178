use serde::{Deserialize, Serialize};

/// Events that drive workflow lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    /// A scan found the workflow due; carries the catalog schedule run id
    Schedule { schedule_run_id: i64 },
    /// Construction and admission begin
    BeginInit,
    /// Admission done, packages start
    BeginExecution,
    /// Every package completed
    Finish,
    /// The run failed or was aborted
    Fail(String),
}

impl WorkflowEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Schedule { .. } => "schedule",
            Self::BeginInit => "begin_init",
            Self::BeginExecution => "begin_execution",
            Self::Finish => "finish",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
