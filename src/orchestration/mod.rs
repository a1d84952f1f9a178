//! # Orchestration
//!
//! - [`SharedState`]: the lock, counter, queue and registry instances plus the
//!   external collaborators, handed to every node
//! - [`Orchestrator`]: the periodic scan that turns due catalog workflows into
//!   running workflow nodes

pub mod orchestrator;
pub mod shared;

pub use orchestrator::{Orchestrator, ScanSummary};
pub use shared::{SharedState, SharedStateBuilder};
