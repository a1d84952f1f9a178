#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # ETL Orchestrator
//!
//! Concurrency core of a batch ETL scheduler.
//!
//! ## Overview
//!
//! Work is pulled from a relational catalog as a strict four-level hierarchy:
//! **Workflow → Package → Realization → Step**. Only steps move data; the
//! upper levels group, order and gate them. Every node, at every level, goes
//! through the same lifecycle: Init (admission), Start (level specific),
//! Finish, or Abort on error or cancellation.
//!
//! Cross-cutting constraints enforced while nodes run:
//!
//! - a global cap on concurrently executing steps (threads)
//! - mutual exclusion per named table, granted in FIFO order
//! - a "locked" mode at every level: a locked node runs alone at its level,
//!   implemented as a lightswitch (one announce counter plus one single-slot
//!   permit per level)
//! - per-realization parallel-step caps
//! - package dependencies, with at most one package node per package id
//!
//! ## Module Organization
//!
//! - [`concurrency`] - level lock, resource counters, FIFO run queues, resource ledger
//! - [`nodes`] - hierarchy lifecycle and the per-level behaviors
//! - [`orchestration`] - shared state handle and the scan loop
//! - [`state_machine`] - workflow lifecycle registry
//! - [`catalog`] - catalog boundary (SQL over PostgreSQL, or in memory)
//! - [`execution`] - connection factory and data mover boundary
//! - [`events`] - lifecycle event stream and operator notification
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use etl_orchestrator::catalog::MemoryCatalog;
//! use etl_orchestrator::config::OrchestratorConfig;
//! use etl_orchestrator::execution::DryRunDataMover;
//! use etl_orchestrator::orchestration::Orchestrator;
//! use std::sync::Arc;
//!
//! # async fn example() -> etl_orchestrator::Result<()> {
//! let config = OrchestratorConfig::default();
//! let catalog = Arc::new(MemoryCatalog::new());
//! let orchestrator = Orchestrator::from_config(
//!     &config,
//!     catalog,
//!     Arc::new(DryRunDataMover::default()),
//! );
//!
//! let summary = orchestrator.scan_once().await?;
//! println!("started {} workflows", summary.started);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod models;
pub mod nodes;
pub mod orchestration;
pub mod state_machine;
pub mod test_helpers;

pub use self::config::{ConfigManager, OrchestratorConfig, SchedulerConfig};
pub use constants::{Level, RunStatus};
pub use error::{OrchestratorError, Result, RunContext};
pub use nodes::{NodeKey, NodeOutcome};
pub use orchestration::{Orchestrator, ScanSummary, SharedState};
pub use state_machine::{LifecycleRegistry, WorkflowEvent, WorkflowState};
