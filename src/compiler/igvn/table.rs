//! The value-numbering table.
//!
//! Maps `(operation, inputs)` to the node that computes it. Entries are never
//! eagerly removed when a node changes; instead every hit is validated against
//! the current graph and stale entries are overwritten.

use rustc_hash::FxHashMap;

use crate::ir::{Graph, Inputs, NodeId, Op};

type Key = (Op, Inputs);

/// Hash-consing table of one IGVN run.
#[derive(Debug, Default)]
pub struct ValueTable {
    entries: FxHashMap<Key, NodeId>,
}

impl ValueTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(graph: &Graph, id: NodeId) -> Option<Key> {
        let op = graph.op(id);
        if !op.is_hashable() {
            return None;
        }
        Some((op.clone(), Inputs::from_slice(graph.inputs(id))))
    }

    fn matches(graph: &Graph, entry: NodeId, key: &Key) -> bool {
        graph.contains(entry)
            && !graph.is_dead(entry)
            && *graph.op(entry) == key.0
            && graph.inputs(entry) == key.1.as_slice()
    }

    /// Returns an equivalent node already in the table, or records `id` as the
    /// representative of its value.
    pub fn lookup_or_insert(&mut self, graph: &Graph, id: NodeId) -> Option<NodeId> {
        let key = Self::key(graph, id)?;
        match self.entries.get(&key) {
            Some(&existing) if existing != id && Self::matches(graph, existing, &key) => {
                Some(existing)
            }
            Some(&existing) if existing == id => None,
            _ => {
                self.entries.insert(key, id);
                None
            }
        }
    }

    /// Finds a live node computing `op` over `inputs`.
    #[must_use]
    pub fn find(&self, graph: &Graph, op: &Op, inputs: &[NodeId]) -> Option<NodeId> {
        let key = (op.clone(), Inputs::from_slice(inputs));
        self.entries
            .get(&key)
            .copied()
            .filter(|&existing| Self::matches(graph, existing, &key))
    }

    /// Forgets `id` under its current key; call before editing a node in place.
    pub fn remove(&mut self, graph: &Graph, id: NodeId) {
        if let Some(key) = Self::key(graph, id) {
            if self.entries.get(&key) == Some(&id) {
                self.entries.remove(&key);
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
