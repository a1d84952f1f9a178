//! External execution collaborators: connection resolution and data movement.

pub mod connection;
pub mod mover;

pub use connection::{ConnectionFactory, ConnectionHandle, StandardConnectionFactory};
pub use mover::{DataMover, DryRunDataMover, MoveReport, StepRequest};
