//! # Level Lock
//!
//! Gives each level two modes: many normal nodes at once, or exactly one
//! exclusive ("locked") node alone. Each level carries an announce counter and a
//! single-slot permit.
//!
//! This is the readers/writers lightswitch. Normal nodes are readers and the
//! exclusive node is the writer; only the 0→1 reader transition, the 1→0 reader
//! transition and the writer touch the permit. Which node takes or returns the
//! permit is decided by [`crate::concurrency::ResourceCounter`]; this type only
//! owns the announcement flag and the permit itself.

use crate::concurrency::poll::Poller;
use crate::concurrency::run_queue::{QueueFamily, RunQueue};
use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
struct LevelSlot {
    announced: Mutex<u32>,
    permit: Semaphore,
}

impl LevelSlot {
    fn new() -> Self {
        Self {
            announced: Mutex::new(0),
            permit: Semaphore::new(1),
        }
    }
}

#[derive(Debug)]
pub struct LevelLock {
    slots: [LevelSlot; Level::COUNT],
    queue: Arc<RunQueue>,
    poller: Poller,
}

impl LevelLock {
    pub fn new(queue: Arc<RunQueue>, poller: Poller) -> Self {
        Self {
            slots: std::array::from_fn(|_| LevelSlot::new()),
            queue,
            poller,
        }
    }

    fn slot(&self, level: Level) -> &LevelSlot {
        &self.slots[level.index()]
    }

    /// Record that one more node demands exclusivity at `level`
    pub fn announce_lock(&self, level: Level) -> u32 {
        let mut announced = self.slot(level).announced.lock();
        *announced += 1;
        debug!(level = %level, announced = *announced, "🔒 lock announced");
        *announced
    }

    /// Withdraw one announcement; withdrawing at zero is fatal
    pub fn remove_lock_flag(&self, level: Level) -> Result<u32> {
        let mut announced = self.slot(level).announced.lock();
        if *announced == 0 {
            return Err(OrchestratorError::CounterUnderflow {
                level,
                counter: "announced",
            });
        }
        *announced -= 1;
        debug!(level = %level, announced = *announced, "🔓 lock flag removed");
        Ok(*announced)
    }

    pub fn is_announced(&self, level: Level) -> bool {
        *self.slot(level).announced.lock() > 0
    }

    pub fn announced_count(&self, level: Level) -> u32 {
        *self.slot(level).announced.lock()
    }

    /// Point check: may a node with this exclusivity start at `level` now?
    pub fn try_admit(&self, level: Level, locked: bool) -> bool {
        locked || !self.is_announced(level)
    }

    /// Wait until [`Self::try_admit`] holds
    pub async fn await_admission(
        &self,
        level: Level,
        locked: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.poller
            .wait_until(cancel, "level announcement to clear", || {
                self.try_admit(level, locked)
            })
            .await
    }

    /// Acquire the level permit, FIFO-gated by the level's permit queue
    ///
    /// On cancellation the permit queue slot is given back and no permit is held.
    pub async fn get_semaphore(
        &self,
        level: Level,
        node_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.queue.enqueue(QueueFamily::Permit, level, node_id)?;

        let acquired = async {
            self.poller
                .wait_until(cancel, "permit queue head", || {
                    self.queue.is_first(QueueFamily::Permit, level, node_id)
                })
                .await?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(OrchestratorError::cancelled("level permit")),
                permit = self.slot(level).permit.acquire() => {
                    let permit = permit.map_err(|_| OrchestratorError::PermitInvariant {
                        level,
                        reason: "permit semaphore closed".to_string(),
                    })?;
                    permit.forget();
                    Ok(())
                }
            }
        }
        .await;

        self.queue.dequeue(QueueFamily::Permit, level, node_id);

        if acquired.is_ok() {
            debug!(level = %level, node_id, "🎫 level permit acquired");
        }
        acquired
    }

    /// Give the level permit back; releasing a free permit is fatal
    pub fn free_semaphore(&self, level: Level) -> Result<()> {
        let permit = &self.slot(level).permit;
        if permit.available_permits() > 0 {
            warn!(level = %level, "attempted to release a permit that is not held");
            return Err(OrchestratorError::PermitInvariant {
                level,
                reason: "released while not held".to_string(),
            });
        }
        permit.add_permits(1);
        debug!(level = %level, "🎫 level permit released");
        Ok(())
    }

    pub fn permit_available(&self, level: Level) -> bool {
        self.slot(level).permit.available_permits() > 0
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }
}
