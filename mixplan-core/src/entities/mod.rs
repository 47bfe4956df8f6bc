//! Tabular Entities
//!
//! The nine entities of the mixture pipeline, in dependency order:
//!
//! ```text
//! SourceMaterial ─┬─> PreMixture ──> Composition ─> Weight ─> Work ─> Result
//!                 └──────────────────────┘             │                 ^
//!                        └─> WeightPremixture ─> WorkPremixture ─> ResultPremixture
//! ```
//!
//! Each entity owns exactly one [`Table`](crate::table::Table) plus its
//! configuration, and exposes a recompute function that derives the table
//! from read-only references to its upstream entities. Recompute functions
//! are pure and idempotent: running one twice against unchanged upstream
//! data yields an identical table.

mod composition;
mod premixture;
mod result;
mod source_material;
mod weight;
mod work;

pub use composition::{Composition, COMPOSITION};
pub use premixture::{PreMixture, PREMIXTURE};
pub use result::{CompositionResult, PremixtureResult};
pub use source_material::{SourceMaterial, LOT, MATERIAL, MOLAR_MASS};
pub use weight::{Weight, WeightPremixture};
pub use work::WorkLog;

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Column label for the solvent residual.
pub const SOLVENT: &str = "Solvent";

/// The unit a source-material catalog is declared in. Fixed at session
/// construction, immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMode {
    /// Mass fraction (`wt%` column).
    WeightPercent,
    /// Millimolar concentration (`mM` + `g/mol` columns).
    Millimolar,
}

impl UnitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitMode::WeightPercent => "wt%",
            UnitMode::Millimolar => "mM",
        }
    }

    /// Label of the total column in tables downstream of this mode:
    /// grams for wt%, milliliters for mM.
    pub fn total_label(self) -> &'static str {
        match self {
            UnitMode::WeightPercent => "TotalWeight",
            UnitMode::Millimolar => "TotalVolume",
        }
    }
}

impl FromStr for UnitMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wt%" => Ok(UnitMode::WeightPercent),
            "mM" => Ok(UnitMode::Millimolar),
            other => Err(CoreError::UnknownUnit(other.to_string())),
        }
    }
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The nine entity kinds, each holding one table per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    SourceMaterial,
    PreMixture,
    Composition,
    Weight,
    WeightPremixture,
    Work,
    WorkPremixture,
    Result,
    ResultPremixture,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::SourceMaterial,
        EntityKind::PreMixture,
        EntityKind::Composition,
        EntityKind::Weight,
        EntityKind::WeightPremixture,
        EntityKind::Work,
        EntityKind::WorkPremixture,
        EntityKind::Result,
        EntityKind::ResultPremixture,
    ];

    /// Stable string tag, used as the snapshot key prefix.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::SourceMaterial => "SourceMaterial",
            EntityKind::PreMixture => "PreMixture",
            EntityKind::Composition => "Composition",
            EntityKind::Weight => "Weight",
            EntityKind::WeightPremixture => "WeightPremixture",
            EntityKind::Work => "Work",
            EntityKind::WorkPremixture => "WorkPremixture",
            EntityKind::Result => "Result",
            EntityKind::ResultPremixture => "ResultPremixture",
        }
    }

    /// Whether external writes to this entity's cells are allowed.
    /// Derived tables only change through recomputation.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            EntityKind::SourceMaterial
                | EntityKind::PreMixture
                | EntityKind::Composition
                | EntityKind::Work
                | EntityKind::WorkPremixture
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Spreadsheet-style uppercase row label: `A`..`Z`, `AA`, `AB`, ...
pub(crate) fn alpha_upper(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        label.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    label.reverse();
    String::from_utf8(label).expect("ascii label")
}

/// Lowercase variant: `a`..`z`, `aa`, `ab`, ...
pub(crate) fn alpha_lower(index: usize) -> String {
    alpha_upper(index).to_ascii_lowercase()
}

/// First-occurrence de-duplication of a name list. Duplicate upstream
/// names collapse to a single downstream column.
pub(crate) fn dedup_names(names: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    unique
}

/// Numeric cell value with unset treated as zero, the summation policy
/// used wherever a row is totalled.
pub(crate) fn num_or_zero(table: &crate::table::Table, row: usize, column: &str) -> f64 {
    table.number(row, column).unwrap_or(0.0)
}

/// Round to `digit` decimal places, the precision of the weighing scale.
pub(crate) fn round_to(value: f64, digit: u32) -> f64 {
    let scale = 10f64.powi(digit as i32);
    (value * scale).round() / scale
}
