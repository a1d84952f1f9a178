//! # Concurrency Core
//!
//! Shared coordination primitives deciding when a hierarchy node may start:
//! the level lightswitch, executing and thread counters, FIFO run queues,
//! the per-node resource ledger and the single polling primitive they all wait
//! through.

pub mod counters;
pub mod ledger;
pub mod level_lock;
pub mod poll;
pub mod run_queue;

pub use counters::{GroupPermit, LevelSnapshot, ResourceCounter};
pub use ledger::{ResourceLedger, ResourceToken};
pub use level_lock::LevelLock;
pub use poll::Poller;
pub use run_queue::{FifoQueue, QueueFamily, RunQueue};
