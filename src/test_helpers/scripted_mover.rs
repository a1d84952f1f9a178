//! Data mover with scripted per-step behavior and concurrency probes.

use crate::error::{OrchestratorError, Result};
use crate::execution::{DataMover, MoveReport, StepRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Script {
    delays: HashMap<i64, Duration>,
    failures: HashSet<i64>,
    blocked: HashSet<i64>,
}

#[derive(Debug, Default)]
struct Observed {
    started: Vec<i64>,
    completed: Vec<i64>,
    table_holders: HashMap<String, i64>,
    table_conflicts: Vec<(String, i64, i64)>,
}

/// Records how steps overlap while they run
///
/// Steps sleep for their scripted delay; blocked steps run until cancelled.
#[derive(Debug, Default)]
pub struct ScriptedDataMover {
    default_delay: Duration,
    script: Mutex<Script>,
    observed: Mutex<Observed>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedDataMover {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            ..Self::default()
        }
    }

    pub fn delay_step(&self, step_id: i64, delay: Duration) {
        self.script.lock().delays.insert(step_id, delay);
    }

    pub fn fail_step(&self, step_id: i64) {
        self.script.lock().failures.insert(step_id);
    }

    /// Keep `step_id` moving data until its scope is cancelled
    pub fn block_step(&self, step_id: i64) {
        self.script.lock().blocked.insert(step_id);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Most steps ever moving data at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<i64> {
        self.observed.lock().started.clone()
    }

    pub fn completed(&self) -> Vec<i64> {
        self.observed.lock().completed.clone()
    }

    /// `(table, holder, intruder)` for every overlap on a table
    pub fn table_conflicts(&self) -> Vec<(String, i64, i64)> {
        self.observed.lock().table_conflicts.clone()
    }

    /// Wait until at least `count` steps started; false on timeout
    pub async fn wait_for_started(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.observed.lock().started.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.observed.lock().started.len() >= count
    }

    fn enter<'a>(&'a self, request: &'a StepRequest) -> Moving<'a> {
        let mut observed = self.observed.lock();
        observed.started.push(request.step_id);
        for table in &request.tables {
            if let Some(holder) = observed
                .table_holders
                .insert(table.clone(), request.step_id)
            {
                observed
                    .table_conflicts
                    .push((table.clone(), holder, request.step_id));
            }
        }
        drop(observed);

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        Moving {
            mover: self,
            request,
            completed: false,
        }
    }
}

/// Marks a step as moving data until dropped, including when its future is cancelled
struct Moving<'a> {
    mover: &'a ScriptedDataMover,
    request: &'a StepRequest,
    completed: bool,
}

impl Drop for Moving<'_> {
    fn drop(&mut self) {
        self.mover.running.fetch_sub(1, Ordering::SeqCst);
        let mut observed = self.mover.observed.lock();
        for table in &self.request.tables {
            if observed.table_holders.get(table) == Some(&self.request.step_id) {
                observed.table_holders.remove(table);
            }
        }
        if self.completed {
            observed.completed.push(self.request.step_id);
        }
    }
}

#[async_trait]
impl DataMover for ScriptedDataMover {
    async fn execute(&self, request: &StepRequest, cancel: &CancellationToken) -> Result<MoveReport> {
        let started = Instant::now();
        let (delay, fails, blocked) = {
            let script = self.script.lock();
            (
                script
                    .delays
                    .get(&request.step_id)
                    .copied()
                    .unwrap_or(self.default_delay),
                script.failures.contains(&request.step_id),
                script.blocked.contains(&request.step_id),
            )
        };

        let mut moving = self.enter(request);
        let cancelled = if blocked {
            cancel.cancelled().await;
            true
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            }
        };
        moving.completed = !cancelled && !fails;
        drop(moving);

        if cancelled {
            return Err(OrchestratorError::cancelled("scripted data movement"));
        }
        if fails {
            return Err(OrchestratorError::DataMover(format!(
                "scripted failure for step {}",
                request.step_id
            )));
        }
        Ok(MoveReport {
            rows_moved: 1,
            elapsed: started.elapsed(),
        })
    }
}
