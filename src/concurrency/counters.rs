//! # Resource Counters
//!
//! Per-level executing counters, the global thread counter and the accessed-table
//! sets. The per-level counters drive the lightswitch in [`LevelLock`]:
//!
//! - an exclusive node always takes the level permit;
//! - the first normal node of a group takes the permit on behalf of the group;
//! - later normal nodes wait for the group to hold the permit, then run without
//!   touching it;
//! - the last normal node to leave returns the permit.
//!
//! If the normal node acquiring for its group is cancelled, the next waiting
//! member of the group takes over the acquisition. A waiting member cancelled
//! after the group took the permit is rolled back like any leaving member, so
//! the last one out still returns the permit.

use crate::concurrency::level_lock::LevelLock;
use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State of the normal group's claim on the level permit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupPermit {
    #[default]
    Idle,
    Acquiring,
    Holding,
}

#[derive(Debug, Default)]
struct LevelState {
    total_executing: u32,
    non_exclusive_executing: u32,
    group: GroupPermit,
    exclusive_holder: Option<i64>,
}

/// Point-in-time view of one level's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSnapshot {
    pub total_executing: u32,
    pub non_exclusive_executing: u32,
    pub group: GroupPermit,
    pub exclusive_holder: Option<i64>,
    pub permit_available: bool,
}

impl LevelSnapshot {
    /// The lightswitch holds: the permit is owned by one exclusive node, by an
    /// active normal group, or by nobody with nothing executing
    pub fn lightswitch_consistent(&self) -> bool {
        match (self.exclusive_holder, self.group) {
            (Some(_), GroupPermit::Holding) => false,
            (Some(_), _) => !self.permit_available,
            (None, GroupPermit::Holding) => {
                !self.permit_available && self.non_exclusive_executing > 0
            }
            (None, GroupPermit::Acquiring) => self.non_exclusive_executing > 0,
            (None, GroupPermit::Idle) => self.permit_available || self.total_executing > 0,
        }
    }
}

#[derive(Debug, Default)]
struct TableSets {
    process: HashSet<String>,
    by_workflow: HashMap<i64, HashSet<String>>,
}

#[derive(Debug)]
pub struct ResourceCounter {
    levels: [Mutex<LevelState>; Level::COUNT],
    threads: Mutex<usize>,
    max_threads: usize,
    tables: Mutex<TableSets>,
    lock: Arc<LevelLock>,
}

impl ResourceCounter {
    pub fn new(lock: Arc<LevelLock>, max_threads: usize) -> Self {
        Self {
            levels: std::array::from_fn(|_| Mutex::new(LevelState::default())),
            threads: Mutex::new(0),
            max_threads,
            tables: Mutex::new(TableSets::default()),
            lock,
        }
    }

    fn level(&self, level: Level) -> &Mutex<LevelState> {
        &self.levels[level.index()]
    }

    /// Count a node as executing at `level`, taking the permit when required
    ///
    /// On any error (cancellation included) the provisional increment is rolled
    /// back and no permit is held.
    pub async fn increase_num_executing(
        &self,
        level: Level,
        locked: bool,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut state = self.level(level).lock();
            state.total_executing += 1;
            if !locked {
                state.non_exclusive_executing += 1;
            }
            debug!(
                level = %level,
                node_id,
                locked,
                total = state.total_executing,
                non_exclusive = state.non_exclusive_executing,
                "➕ executing counters increased"
            );
        }

        let joined = if locked {
            self.acquire_exclusive(level, node_id, cancel).await
        } else {
            self.join_group(level, node_id, cancel).await
        };

        if let Err(e) = joined {
            self.decrease_num_executing_on_error(level, locked)?;
            return Err(e);
        }
        Ok(())
    }

    async fn acquire_exclusive(
        &self,
        level: Level,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.lock.get_semaphore(level, node_id, cancel).await?;
        self.level(level).lock().exclusive_holder = Some(node_id);
        Ok(())
    }

    async fn join_group(
        &self,
        level: Level,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let claimed = {
                let mut state = self.level(level).lock();
                match state.group {
                    GroupPermit::Holding => return Ok(()),
                    GroupPermit::Idle => {
                        state.group = GroupPermit::Acquiring;
                        true
                    }
                    GroupPermit::Acquiring => false,
                }
            };

            if claimed {
                return match self.lock.get_semaphore(level, node_id, cancel).await {
                    Ok(()) => {
                        self.level(level).lock().group = GroupPermit::Holding;
                        debug!(level = %level, node_id, "👥 normal group holds the level permit");
                        Ok(())
                    }
                    Err(e) => {
                        self.level(level).lock().group = GroupPermit::Idle;
                        Err(e)
                    }
                };
            }

            self.lock
                .poller()
                .wait_until(cancel, "normal group permit", || {
                    self.level(level).lock().group != GroupPermit::Acquiring
                })
                .await?;
        }
    }

    /// Undo a counted node, returning the permit when this node was its last user
    pub fn decrease_num_executing(&self, level: Level, locked: bool, node_id: i64) -> Result<()> {
        let release = {
            let mut state = self.level(level).lock();
            Self::decrement(&mut state, level, locked)?;
            if locked {
                if state.exclusive_holder == Some(node_id) {
                    state.exclusive_holder = None;
                    true
                } else {
                    warn!(level = %level, node_id, "exclusive node decreased without holding the permit");
                    false
                }
            } else if state.non_exclusive_executing == 0 && state.group == GroupPermit::Holding {
                state.group = GroupPermit::Idle;
                true
            } else {
                false
            }
        };

        if release {
            self.lock.free_semaphore(level)?;
        }
        debug!(level = %level, node_id, locked, released_permit = release, "➖ executing counters decreased");
        Ok(())
    }

    /// Roll back a provisional increment whose own permit wait never completed
    ///
    /// A normal node cancelled while its group already holds the permit may be
    /// the group's last counted member; the group permit is returned then.
    pub fn decrease_num_executing_on_error(&self, level: Level, locked: bool) -> Result<()> {
        let release = {
            let mut state = self.level(level).lock();
            Self::decrement(&mut state, level, locked)?;
            let release = !locked
                && state.non_exclusive_executing == 0
                && state.group == GroupPermit::Holding;
            if release {
                state.group = GroupPermit::Idle;
            }
            release
        };

        if release {
            self.lock.free_semaphore(level)?;
        }
        debug!(level = %level, locked, released_permit = release, "↩️ executing counters rolled back");
        Ok(())
    }

    fn decrement(state: &mut LevelState, level: Level, locked: bool) -> Result<()> {
        if state.total_executing == 0 {
            return Err(OrchestratorError::CounterUnderflow {
                level,
                counter: "total_executing",
            });
        }
        if !locked && state.non_exclusive_executing == 0 {
            return Err(OrchestratorError::CounterUnderflow {
                level,
                counter: "non_exclusive_executing",
            });
        }
        state.total_executing -= 1;
        if !locked {
            state.non_exclusive_executing -= 1;
        }
        Ok(())
    }

    pub fn snapshot(&self, level: Level) -> LevelSnapshot {
        let state = self.level(level).lock();
        LevelSnapshot {
            total_executing: state.total_executing,
            non_exclusive_executing: state.non_exclusive_executing,
            group: state.group,
            exclusive_holder: state.exclusive_holder,
            permit_available: self.lock.permit_available(level),
        }
    }

    pub fn total_executing(&self, level: Level) -> u32 {
        self.level(level).lock().total_executing
    }

    // Thread cap

    /// Count one more running step; refused at the cap
    pub fn increase_threads(&self) -> Result<usize> {
        let mut threads = self.threads.lock();
        if *threads >= self.max_threads {
            return Err(OrchestratorError::ThreadLimitExceeded {
                max: self.max_threads,
            });
        }
        *threads += 1;
        Ok(*threads)
    }

    pub fn decrease_threads(&self) -> Result<usize> {
        let mut threads = self.threads.lock();
        if *threads == 0 {
            return Err(OrchestratorError::CounterUnderflow {
                level: Level::Step,
                counter: "threads",
            });
        }
        *threads -= 1;
        Ok(*threads)
    }

    pub fn thread_limit_reached(&self) -> bool {
        *self.threads.lock() >= self.max_threads
    }

    pub fn threads(&self) -> usize {
        *self.threads.lock()
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    // Accessed tables

    /// Mark every table as accessed, process-wide and for `workflow_id`
    ///
    /// Fails without changing anything when any table is already accessed.
    pub fn add_accessed_tables(&self, workflow_id: i64, tables: &[String]) -> Result<()> {
        let mut sets = self.tables.lock();
        if let Some(table) = tables.iter().find(|table| sets.process.contains(*table)) {
            return Err(OrchestratorError::DuplicateTable {
                table: table.clone(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(table) = tables.iter().find(|table| !seen.insert(table.as_str())) {
            return Err(OrchestratorError::DuplicateTable {
                table: table.clone(),
            });
        }

        sets.process.extend(tables.iter().cloned());
        sets.by_workflow
            .entry(workflow_id)
            .or_default()
            .extend(tables.iter().cloned());
        Ok(())
    }

    /// Drop tables from both sets; returns how many were held
    pub fn remove_accessed_tables(&self, workflow_id: i64, tables: &[String]) -> usize {
        let mut sets = self.tables.lock();
        let mut removed = 0;
        for table in tables {
            if sets.process.remove(table) {
                removed += 1;
            }
        }
        if let Some(held) = sets.by_workflow.get_mut(&workflow_id) {
            for table in tables {
                held.remove(table);
            }
            if held.is_empty() {
                sets.by_workflow.remove(&workflow_id);
            }
        }
        removed
    }

    pub fn is_table_accessed(&self, table: &str) -> bool {
        self.tables.lock().process.contains(table)
    }

    pub fn any_table_accessed(&self, tables: &[String]) -> bool {
        let sets = self.tables.lock();
        tables.iter().any(|table| sets.process.contains(table))
    }

    pub fn workflow_tables(&self, workflow_id: i64) -> HashSet<String> {
        self.tables
            .lock()
            .by_workflow
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn accessed_table_count(&self) -> usize {
        self.tables.lock().process.len()
    }
}
