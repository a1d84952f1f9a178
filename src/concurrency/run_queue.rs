//! # Run Queues
//!
//! Three independent FIFO families:
//!
//! - **Admission** (per level): nodes that observed an announced lock line up
//!   here so admission order follows arrival order.
//! - **Permit** (per level): serializes acquisition of the level permit so an
//!   exclusive node cannot be starved by a stream of normal groups.
//! - **Table** (per resource name): a step enqueues on every table it touches and
//!   proceeds only once it is first on all of them.
//!
//! "First in queue" is a point-in-time check. Callers poll it through
//! [`crate::concurrency::Poller`]; nothing here wakes anybody up.

use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// Per-level queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueFamily {
    Admission,
    Permit,
}

impl QueueFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueueFamily::Admission => "admission",
            QueueFamily::Permit => "permit",
        }
    }
}

/// FIFO of node ids; an id appears at most once
#[derive(Debug, Default, Clone)]
pub struct FifoQueue {
    entries: VecDeque<i64>,
}

impl FifoQueue {
    pub fn push(&mut self, id: i64) -> bool {
        if self.entries.contains(&id) {
            return false;
        }
        self.entries.push_back(id);
        true
    }

    pub fn remove(&mut self, id: i64) -> bool {
        match self.entries.iter().position(|entry| *entry == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_first(&self, id: i64) -> bool {
        self.entries.front() == Some(&id)
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.entries.iter().position(|entry| *entry == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<i64> {
        self.entries.iter().copied().collect()
    }
}

/// All FIFO queues used by the scheduler
#[derive(Debug)]
pub struct RunQueue {
    admission: [Mutex<FifoQueue>; Level::COUNT],
    permit: [Mutex<FifoQueue>; Level::COUNT],
    tables: DashMap<String, FifoQueue>,
    // Serializes multi-table enqueues so two steps never interleave across queues
    table_enqueue: Mutex<()>,
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RunQueue {
    pub fn new() -> Self {
        Self {
            admission: std::array::from_fn(|_| Mutex::new(FifoQueue::default())),
            permit: std::array::from_fn(|_| Mutex::new(FifoQueue::default())),
            tables: DashMap::new(),
            table_enqueue: Mutex::new(()),
        }
    }

    fn family(&self, family: QueueFamily, level: Level) -> &Mutex<FifoQueue> {
        match family {
            QueueFamily::Admission => &self.admission[level.index()],
            QueueFamily::Permit => &self.permit[level.index()],
        }
    }

    /// Append `id` to a level queue; enqueuing twice is an invariant violation
    pub fn enqueue(&self, family: QueueFamily, level: Level, id: i64) -> Result<()> {
        let mut queue = self.family(family, level).lock();
        if !queue.push(id) {
            return Err(OrchestratorError::QueueInvariant {
                queue: format!("{} {}", level, family.as_str()),
                reason: format!("id {id} is already enqueued"),
            });
        }
        debug!(
            queue = family.as_str(),
            level = %level,
            node_id = id,
            position = queue.len() - 1,
            "enqueued"
        );
        Ok(())
    }

    /// Remove `id` wherever it sits; returns whether it was present
    pub fn dequeue(&self, family: QueueFamily, level: Level, id: i64) -> bool {
        let removed = self.family(family, level).lock().remove(id);
        if removed {
            debug!(queue = family.as_str(), level = %level, node_id = id, "dequeued");
        }
        removed
    }

    pub fn is_first(&self, family: QueueFamily, level: Level, id: i64) -> bool {
        self.family(family, level).lock().is_first(id)
    }

    pub fn is_queued(&self, family: QueueFamily, level: Level, id: i64) -> bool {
        self.family(family, level).lock().contains(id)
    }

    pub fn len(&self, family: QueueFamily, level: Level) -> usize {
        self.family(family, level).lock().len()
    }

    pub fn snapshot(&self, family: QueueFamily, level: Level) -> Vec<i64> {
        self.family(family, level).lock().snapshot()
    }

    /// Enqueue `id` on the queue of every table in `tables`
    ///
    /// Either every queue receives the id or none does. Concurrent multi-table
    /// enqueues are serialized, so relative order is the same on every shared queue.
    pub fn enqueue_tables(&self, tables: &[String], id: i64) -> Result<()> {
        let _serial = self.table_enqueue.lock();
        if let Some(table) = tables
            .iter()
            .find(|table| self.tables.get(*table).is_some_and(|q| q.contains(id)))
        {
            return Err(OrchestratorError::QueueInvariant {
                queue: format!("table {table}"),
                reason: format!("id {id} is already enqueued"),
            });
        }

        for table in tables {
            self.tables.entry(table.clone()).or_default().push(id);
        }
        debug!(node_id = id, tables = ?tables, "enqueued on table queues");
        Ok(())
    }

    /// Whether `id` heads the queue of every table in `tables`
    pub fn is_first_on_all(&self, tables: &[String], id: i64) -> bool {
        tables
            .iter()
            .all(|table| self.tables.get(table).is_some_and(|q| q.is_first(id)))
    }

    /// Remove `id` from every table queue in `tables`; returns how many held it
    pub fn dequeue_tables(&self, tables: &[String], id: i64) -> usize {
        let mut removed = 0;
        for table in tables {
            let now_empty = match self.tables.get_mut(table) {
                Some(mut queue) => {
                    if queue.remove(id) {
                        removed += 1;
                    }
                    queue.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.tables.remove_if(table, |_, queue| queue.is_empty());
            }
        }
        if removed > 0 {
            debug!(node_id = id, removed, "dequeued from table queues");
        }
        removed
    }

    pub fn table_queue(&self, table: &str) -> Vec<i64> {
        self.tables
            .get(table)
            .map(|queue| queue.snapshot())
            .unwrap_or_default()
    }
}
