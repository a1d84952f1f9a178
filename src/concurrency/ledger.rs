//! Resource-acquisition ledger.
//!
//! Every reservation a node makes is recorded as a [`ResourceToken`]. Finish and
//! Abort both drain the same ledger, so a reservation is released exactly once
//! no matter which path runs first.

use std::collections::HashSet;

/// One reservation held by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceToken {
    /// Announced a lock at the node's level
    Announced,
    /// Waiting in the level admission queue
    AdmissionQueued,
    /// Enqueued on the table queues of its tables
    TablesQueued,
    /// Counted by the level executing counters
    Counters,
    /// Occupies one of the parent realization's parallel step slots
    ParallelSlot,
    /// Counted by the global thread counter
    Thread,
    /// Holds its tables in the accessed-table sets
    TablesAccessed,
}

impl ResourceToken {
    /// Order in which a drain hands tokens back
    pub const RELEASE_ORDER: [ResourceToken; 7] = [
        ResourceToken::TablesAccessed,
        ResourceToken::Thread,
        ResourceToken::Counters,
        ResourceToken::ParallelSlot,
        ResourceToken::TablesQueued,
        ResourceToken::AdmissionQueued,
        ResourceToken::Announced,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceToken::Announced => "announced",
            ResourceToken::AdmissionQueued => "admission_queued",
            ResourceToken::TablesQueued => "tables_queued",
            ResourceToken::Counters => "counters",
            ResourceToken::ParallelSlot => "parallel_slot",
            ResourceToken::Thread => "thread",
            ResourceToken::TablesAccessed => "tables_accessed",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResourceLedger {
    held: HashSet<ResourceToken>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token; returns false when it was already held
    pub fn acquire(&mut self, token: ResourceToken) -> bool {
        self.held.insert(token)
    }

    /// Forget a token; returns whether it was held
    pub fn release(&mut self, token: ResourceToken) -> bool {
        self.held.remove(&token)
    }

    pub fn holds(&self, token: ResourceToken) -> bool {
        self.held.contains(&token)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Take every held token, in release order
    pub fn drain(&mut self) -> Vec<ResourceToken> {
        let drained = ResourceToken::RELEASE_ORDER
            .iter()
            .copied()
            .filter(|token| self.held.contains(token))
            .collect();
        self.held.clear();
        drained
    }
}
