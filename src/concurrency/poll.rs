//! Poll-based waiting.
//!
//! Queue positions, level announcements, table contention and thread room are
//! all re-checked on a fixed interval rather than signalled. [`Poller`] is the
//! single place that interval lives; every waiting call site goes through it so
//! the interval is one tunable.
//!
//! Every wait races against a [`CancellationToken`] so cancelling a workflow
//! scope unblocks its pending waits immediately instead of at the next tick.

use crate::error::{OrchestratorError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `ready` returns true, re-checking every interval
    pub async fn wait_until<F>(
        &self,
        cancel: &CancellationToken,
        waiting_for: &str,
        mut ready: F,
    ) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        self.wait_for(cancel, waiting_for, || Ok(ready())).await
    }

    /// Wait until a fallible predicate returns `Ok(true)`
    ///
    /// A predicate error ends the wait and is returned as is.
    pub async fn wait_for<F>(
        &self,
        cancel: &CancellationToken,
        waiting_for: &str,
        mut ready: F,
    ) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let mut polls: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::cancelled(waiting_for));
            }
            if ready()? {
                if polls > 0 {
                    trace!(waiting_for = %waiting_for, polls, "wait satisfied");
                }
                return Ok(());
            }
            polls += 1;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(OrchestratorError::cancelled(waiting_for));
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}
