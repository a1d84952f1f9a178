//! Registry of live hierarchy nodes keyed by level and catalog id.
//!
//! Parents own their children's [`NodeCore`]s; children refer back to their
//! parent by [`NodeKey`] only and resolve it through the arena.

use super::core::NodeCore;
use crate::constants::Level;
use crate::error::{OrchestratorError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub level: Level,
    pub id: i64,
}

impl NodeKey {
    pub const fn new(level: Level, id: i64) -> Self {
        Self { level, id }
    }

    pub const fn workflow(id: i64) -> Self {
        Self::new(Level::Workflow, id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.id)
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: DashMap<NodeKey, Arc<NodeCore>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a node; a key can be live only once
    pub fn insert(&self, node: Arc<NodeCore>) -> Result<()> {
        let key = node.key();
        match self.nodes.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(OrchestratorError::NodeAlreadyActive(key.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    pub fn remove(&self, key: NodeKey) -> Option<Arc<NodeCore>> {
        self.nodes.remove(&key).map(|(_, node)| node)
    }

    /// Remove `node` only if its key still maps to that same node
    pub fn remove_node(&self, node: &NodeCore) -> bool {
        self.nodes
            .remove_if(&node.key(), |_, live| std::ptr::eq(live.as_ref(), node))
            .is_some()
    }

    pub fn get(&self, key: NodeKey) -> Option<Arc<NodeCore>> {
        self.nodes.get(&key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the live nodes at `level`, ascending
    pub fn live_at(&self, level: Level) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .nodes
            .iter()
            .filter(|entry| entry.key().level == level)
            .map(|entry| entry.key().id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
