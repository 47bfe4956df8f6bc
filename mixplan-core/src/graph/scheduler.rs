//! Propagation Scheduling
//!
//! [`DependencyGraph`] decides which entities must recompute after a write
//! and in what order. Dependencies are always processed before their
//! dependents.
//!
//! # Algorithm
//!
//! 1. When an entity's owned field changes, mark all its transitive
//!    dependents dirty (BFS over reverse edges).
//! 2. Sort the dirty set topologically (Kahn's algorithm, restricted to
//!    the dirty set).
//! 3. The caller recomputes each node in that order and marks it clean.
//!
//! The changed node itself is not part of the result: writes originate
//! outside the graph and the owner's table is already current.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use super::node::{Node, NodeId};
use crate::error::CoreError;

/// The dependency graph over all entities of one session.
pub struct DependencyGraph {
    /// All nodes, in insertion order for deterministic traversal.
    nodes: IndexMap<NodeId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a dependency edge: `dependent` reads from `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(node) = self.nodes.get_mut(&dependency) {
            node.add_dependent(dependent);
        }
        if let Some(node) = self.nodes.get_mut(&dependent) {
            node.add_dependency(dependency);
        }
    }

    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    /// Mark a node's transitive dependents dirty and return them in
    /// topological order. The changed node itself is excluded.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_dirty();
                affected.push(node_id);
                let dependents: Vec<NodeId> = node.dependents().to_vec();
                queue.extend(dependents);
            }
        }

        trace!(affected = affected.len(), "dirty propagation");
        self.topological_sort(affected)
    }

    /// Order the given nodes so dependencies come before dependents
    /// (Kahn's algorithm over edges within the set).
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);
            if let Some(node) = self.nodes.get(&node_id) {
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// Verify the whole graph is a DAG. Run once at session construction.
    pub fn validate_acyclic(&self) -> Result<(), CoreError> {
        let all: Vec<NodeId> = self.nodes.keys().copied().collect();
        let sorted = self.topological_sort(all);
        if sorted.len() == self.nodes.len() {
            Ok(())
        } else {
            Err(CoreError::DependencyCycle)
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
