//! # Workflow Lifecycle State Machine
//!
//! Finite-state tracking of workflow instances across
//! `Scheduled → Initializing → Executing → Finished | Failed`.

pub mod events;
pub mod lifecycle;
pub mod states;

pub use events::WorkflowEvent;
pub use lifecycle::LifecycleRegistry;
pub use states::WorkflowState;
