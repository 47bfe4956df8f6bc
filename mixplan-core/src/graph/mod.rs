//! Dependency Graph
//!
//! The entity pipeline is wired as an explicit observer graph: a directed
//! acyclic graph where nodes are entities and an edge from B to A means
//! "A reads a field owned by B".
//!
//! When an owned field changes, the graph computes the set of affected
//! nodes and hands them back in topological order, so each entity
//! recomputes only after all of its direct dependencies have stabilized —
//! one pass per write, no batching.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than distributed across entities:
//!    that keeps topological ordering and cycle validation in one place.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are
//!    maintained for traversal in either direction.
//!
//! 3. Acyclicity is validated once, at session construction. Edges never
//!    change afterwards; only dirty state does.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId};
pub use scheduler::DependencyGraph;
