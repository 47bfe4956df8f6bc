//! Graph Nodes
//!
//! One node per tabular entity. Edges are stored inline on both ends; the
//! fan-out of the mixture pipeline is small, so edge lists live in
//! `SmallVec`s and stay on the node.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The entity's table is up-to-date.
    Clean,

    /// An upstream field changed; the entity must recompute.
    Dirty,
}

type EdgeList = SmallVec<[NodeId; 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    dirty: DirtyState,

    /// Nodes this node reads from (parents in the DAG).
    dependencies: EdgeList,

    /// Nodes that read from this node (children in the DAG).
    dependents: EdgeList,
}

impl Node {
    pub fn new() -> Self {
        Self {
            id: NodeId::new(),
            dirty: DirtyState::Clean,
            dependencies: EdgeList::new(),
            dependents: EdgeList::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Record that this node reads from `node_id`. Duplicate edges are
    /// collapsed.
    pub fn add_dependency(&mut self, node_id: NodeId) {
        if !self.dependencies.contains(&node_id) {
            self.dependencies.push(node_id);
        }
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Record that `node_id` reads from this node. Duplicate edges are
    /// collapsed.
    pub fn add_dependent(&mut self, node_id: NodeId) {
        if !self.dependents.contains(&node_id) {
            self.dependents.push(node_id);
        }
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
