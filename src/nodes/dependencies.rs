//! Package execution registry.
//!
//! Guarantees at most one initialization in flight per package id. A package
//! is either absent, `initializing` (one requester is constructing it), or
//! `executing` with a completion handle every later requester reuses. Entries
//! stay until the owning workflow run ends, so dependents arriving after the
//! package completed still observe its outcome.

use super::completion::CompletionHandle;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What a requester must do for a package id
#[derive(Debug, Clone)]
pub enum Claim {
    /// Package already registered; wait on this handle
    Reuse(CompletionHandle),
    /// Another requester is constructing it; poll again
    Wait,
    /// This requester now owns construction and must `register` or `abandon`
    Construct,
}

#[derive(Debug)]
struct ExecutingPackage {
    handle: CompletionHandle,
    owner_workflow: i64,
}

#[derive(Debug, Default)]
struct RegistryState {
    initializing: HashSet<i64>,
    executing: HashMap<i64, ExecutingPackage>,
    constructed: HashMap<i64, usize>,
}

#[derive(Debug, Default)]
pub struct PackageExecutionRegistry {
    state: Mutex<RegistryState>,
}

impl PackageExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, package_id: i64) -> Claim {
        let mut state = self.state.lock();
        if let Some(executing) = state.executing.get(&package_id) {
            return Claim::Reuse(executing.handle.clone());
        }
        if state.initializing.contains(&package_id) {
            return Claim::Wait;
        }
        state.initializing.insert(package_id);
        Claim::Construct
    }

    /// Publish the handle of a constructed package and end its initialization
    pub fn register(&self, package_id: i64, owner_workflow: i64, handle: CompletionHandle) {
        let mut state = self.state.lock();
        state.executing.insert(
            package_id,
            ExecutingPackage {
                handle,
                owner_workflow,
            },
        );
        state.initializing.remove(&package_id);
        *state.constructed.entry(package_id).or_default() += 1;
        debug!(package_id, owner_workflow, "package registered as executing");
    }

    /// Give up a construction claim without registering
    pub fn abandon(&self, package_id: i64) {
        self.state.lock().initializing.remove(&package_id);
    }

    pub fn is_initializing(&self, package_id: i64) -> bool {
        self.state.lock().initializing.contains(&package_id)
    }

    pub fn is_executing(&self, package_id: i64) -> bool {
        self.state.lock().executing.contains_key(&package_id)
    }

    /// Drop every entry constructed under `workflow_id`; returns how many
    pub fn release_workflow(&self, workflow_id: i64) -> usize {
        let mut state = self.state.lock();
        let before = state.executing.len();
        state
            .executing
            .retain(|_, executing| executing.owner_workflow != workflow_id);
        before - state.executing.len()
    }

    /// How many package nodes were ever constructed for `package_id`
    pub fn constructed_count(&self, package_id: i64) -> usize {
        self.state
            .lock()
            .constructed
            .get(&package_id)
            .copied()
            .unwrap_or(0)
    }
}
