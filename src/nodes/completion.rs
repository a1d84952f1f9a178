//! Completion signalling for hierarchy nodes.
//!
//! Each node owns one [`CompletionSignal`]. Any number of [`CompletionHandle`]s
//! can wait on it; package dependency handles are shared this way between every
//! dependent that asked for the same package.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use crate::constants::RunStatus;

/// How a node run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOutcome {
    Finished,
    Failed(String),
    Aborted,
}

impl NodeOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, NodeOutcome::Finished)
    }

    pub fn run_status(&self) -> RunStatus {
        match self {
            NodeOutcome::Finished => RunStatus::Finished,
            NodeOutcome::Failed(_) => RunStatus::Failed,
            NodeOutcome::Aborted => RunStatus::Aborted,
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::Finished => write!(f, "finished"),
            NodeOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            NodeOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug)]
pub struct CompletionSignal {
    sender: watch::Sender<Option<NodeOutcome>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Record the outcome; only the first call has any effect
    pub fn complete(&self, outcome: NodeOutcome) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    pub fn outcome(&self) -> Option<NodeOutcome> {
        self.sender.borrow().clone()
    }

    pub fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Shareable wait handle on one node's completion
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    receiver: watch::Receiver<Option<NodeOutcome>>,
}

impl CompletionHandle {
    /// Wait for the node to complete
    ///
    /// A node dropped without completing counts as aborted.
    pub async fn wait(&self) -> NodeOutcome {
        let mut receiver = self.receiver.clone();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(NodeOutcome::Aborted)
    }

    pub fn outcome(&self) -> Option<NodeOutcome> {
        self.receiver.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}
