//! # Hierarchy Nodes
//!
//! The Workflow → Package → Realization → Step tree. Every level shares the
//! lifecycle in [`core`]; the level modules only supply what `Start` does.
//!
//! Nodes live in the [`NodeArena`] keyed by level and catalog id. A parent owns
//! its children's cores, a child knows its parent by key only. Package
//! completion handles are the one cross-link between branches and are shared
//! through the [`PackageExecutionRegistry`].

pub mod arena;
pub mod completion;
pub mod core;
pub mod dependencies;
pub mod package;
pub mod realization;
pub mod step;
pub mod workflow;

pub use arena::{NodeArena, NodeKey};
pub use completion::{CompletionHandle, CompletionSignal, NodeOutcome};
pub use self::core::{spawn_node, NodeBehavior, NodeCore, NodeSpec};
pub use dependencies::{Claim, PackageExecutionRegistry};
pub use package::{ensure_package, PackageBehavior};
pub use realization::{ParallelSlots, RealizationBehavior};
pub use step::StepBehavior;
pub use workflow::WorkflowBehavior;
