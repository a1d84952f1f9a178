//! Catalog definitions of the Workflow → Package → Realization → Step hierarchy
//! and the connections steps move data between.

pub mod connection;
pub mod package;
pub mod placeholders;
pub mod realization;
pub mod step;
pub mod workflow;

pub use connection::{BackendKind, ConnectionInfo};
pub use package::{PackageDefinition, PackageDependency};
pub use placeholders::{resolve_tables, substitute_placeholders};
pub use realization::{priority_tiers, RealizationDefinition};
pub use step::{StepDefinition, StepKind};
pub use workflow::{WorkflowDefinition, WorkflowParameters};
