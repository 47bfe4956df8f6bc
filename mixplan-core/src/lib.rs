//! Mixplan Core
//!
//! The reactive computation core of a mixture-preparation planner. A
//! [`Session`] holds nine tabular entities — a catalog of source
//! materials, premixture and composition designs, solved target weights,
//! operator work logs, and resulting concentrations — wired into a
//! dependency graph. Writing any cell synchronously recomputes everything
//! downstream, dependencies before dependents, and notifies subscribers.
//!
//! # Modules
//!
//! - `table`: the cell/table data model shared by every entity
//! - `graph`: dirty propagation and topological scheduling
//! - `entities`: the nine entities and their recompute rules
//! - `session`: ownership, mutation surface, subscribers
//! - `snapshot`: JSON save/restore of a whole session
//!
//! # Example
//!
//! ```rust
//! use mixplan_core::{Cell, EntityKind, Session, UnitMode};
//!
//! let mut session = Session::new(UnitMode::WeightPercent)?;
//!
//! // Material B is a 50 wt% stock; composition A wants 10% of it.
//! session.set_cell(EntityKind::SourceMaterial, 1, "wt%", Cell::number(50.0))?;
//! session.set_cell(EntityKind::Composition, 0, "Material B", Cell::number(10.0))?;
//!
//! // The target weight doubles the shortfall to compensate for dilution.
//! let weight = session.table(EntityKind::Weight);
//! assert_eq!(weight.number(0, "Material B"), Some(20.0));
//! # Ok::<(), mixplan_core::CoreError>(())
//! ```

pub mod entities;
pub mod error;
pub mod graph;
pub mod session;
pub mod snapshot;
pub mod table;

pub use entities::{EntityKind, UnitMode};
pub use error::CoreError;
pub use session::{Session, SharedSession, SubscriberId};
pub use table::{Cell, Table};
