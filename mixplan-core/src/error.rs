//! Error Taxonomy
//!
//! Structural and configuration problems are fatal: no partial table is
//! produced and the error surfaces to the caller immediately. `NotReady` is
//! the one recoverable kind — a recomputation fired before its upstream
//! finished structural setup silently skips its turn and waits for the next
//! trigger.
//!
//! Arithmetic edge cases (0/0, division by zero) are deliberately *not*
//! errors anywhere in this crate. They are normalized to documented
//! sentinels (unset cells, non-limiting allocation ratios) by the entities
//! themselves.

use thiserror::Error;

use crate::entities::EntityKind;

/// Everything that can go wrong inside the reactive core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unit mode string was neither `"wt%"` nor `"mM"`.
    #[error("unsupported unit mode `{0}`; expected \"wt%\" or \"mM\"")]
    UnknownUnit(String),

    /// A table was handed columns of unequal length, or a row of the
    /// wrong arity.
    #[error("malformed column set: {0}")]
    MalformedColumns(String),

    /// A recomputation fired before an upstream entity finished its
    /// structural setup. Recoverable: the dependent simply waits for the
    /// next trigger.
    #[error("{entity} is not ready: {reason}")]
    NotReady {
        entity: EntityKind,
        reason: &'static str,
    },

    /// Attempted write to a derived entity.
    #[error("{0} is derived from upstream tables and cannot be edited")]
    NotEditable(EntityKind),

    #[error("row {row} is out of bounds (table has {nrows} rows)")]
    RowOutOfBounds { row: usize, nrows: usize },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// The entity wiring contains a cycle. Raised at session construction;
    /// the session is never built in that state.
    #[error("entity dependency graph contains a cycle")]
    DependencyCycle,

    /// A mutation arrived while a propagation pass was running. Writes
    /// must be serialized through one evaluation queue per session.
    #[error("mutation attempted during an active propagation pass")]
    Reentrant,

    /// A snapshot key did not resolve to a registered entity kind.
    #[error("unknown entity tag `{0}` in snapshot")]
    UnknownEntityTag(String),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot serialization failed")]
    Snapshot(#[from] serde_json::Error),
}
