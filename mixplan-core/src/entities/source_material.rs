//! Source Materials
//!
//! The catalog of raw chemical inputs. Every downstream table keys its
//! material columns by the names in this table's `Material` column, so the
//! cached `names` list is the structural trigger for the whole pipeline:
//! it is replaced only when its content actually differs, which keeps
//! no-op edits from cascading.
//!
//! In `wt%` mode a material carries its stock concentration directly. In
//! `mM` mode it carries a molar concentration plus molar mass, converted
//! to weight-percent on demand against a fixed 1000 mL solvent basis.

use indexmap::IndexMap;
use tracing::trace;

use super::{alpha_upper, UnitMode};
use crate::error::CoreError;
use crate::table::{Cell, Table};

/// Name column label.
pub const MATERIAL: &str = "Material";
/// Free-text lot column label.
pub const LOT: &str = "Lot";
/// Molar mass column label (mM mode only).
pub const MOLAR_MASS: &str = "g/mol";

/// The catalog of source materials.
#[derive(Debug)]
pub struct SourceMaterial {
    unit: UnitMode,
    nrows: usize,
    table: Table,
    names: Vec<String>,
}

impl SourceMaterial {
    /// Build the catalog with default rows (`Material A`, `Material B`, ...
    /// at 100 concentration).
    pub fn new(unit: UnitMode, nrows: usize) -> Self {
        let columns: Vec<&str> = match unit {
            UnitMode::WeightPercent => vec![MATERIAL, LOT, "wt%"],
            UnitMode::Millimolar => vec![MATERIAL, LOT, "mM", MOLAR_MASS],
        };
        let mut table = Table::new();
        for name in &columns {
            table
                .insert_column(name.to_string(), Vec::new())
                .expect("fresh column set");
        }
        let mut material = Self {
            unit,
            nrows: 0,
            table,
            names: Vec::new(),
        };
        material.resize(nrows);
        material
    }

    fn make_row(&self, index: usize) -> Vec<Cell> {
        let mut row = vec![
            Cell::text(format!("Material {}", alpha_upper(index))),
            Cell::Unset,
            Cell::number(100.0),
        ];
        if self.unit == UnitMode::Millimolar {
            // molar mass has no sensible default
            row.push(Cell::Unset);
        }
        row
    }

    /// Grow with default rows or truncate, preserving the first rows.
    pub fn resize(&mut self, nrows: usize) {
        if nrows < self.table.nrows() {
            self.table.truncate(nrows);
        } else {
            for i in self.table.nrows()..nrows {
                let row = self.make_row(i);
                self.table.push_row(row).expect("row arity matches columns");
            }
        }
        self.nrows = nrows;
        self.refresh_names();
    }

    /// Re-derive the cached name list from the `Material` column.
    ///
    /// Returns whether the list actually changed; unchanged content is not
    /// replaced, so downstream reconciliation sees a stable reference.
    pub fn refresh_names(&mut self) -> bool {
        let names: Vec<String> = (0..self.table.nrows())
            .map(|row| self.table.text(row, MATERIAL).unwrap_or("").to_string())
            .collect();
        if names == self.names {
            return false;
        }
        trace!(count = names.len(), "material names changed");
        self.names = names;
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn unit(&self) -> UnitMode {
        self.unit
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Write one cell. Editing the `Material` column refreshes the cached
    /// name list.
    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> Result<(), CoreError> {
        self.table.set_cell(row, column, value)?;
        if column == MATERIAL {
            self.refresh_names();
        }
        Ok(())
    }

    pub fn remove_row(&mut self, row: usize) -> Result<(), CoreError> {
        self.table.remove_row(row)?;
        self.nrows = self.table.nrows();
        self.refresh_names();
        Ok(())
    }

    /// Replace the whole table (snapshot restore).
    pub fn replace_table(&mut self, table: Table) -> Result<(), CoreError> {
        if !table.has_column(MATERIAL) {
            return Err(CoreError::MalformedColumns(format!(
                "source material table lacks a `{MATERIAL}` column"
            )));
        }
        self.nrows = table.nrows();
        self.table = table;
        self.refresh_names();
        Ok(())
    }

    /// Stock concentration of each material in weight-percent, regardless
    /// of unit mode.
    ///
    /// In mM mode the conversion assumes the concentration refers to a
    /// 1000 mL solvent basis:
    /// `wt% = (mM · g/mol / 1000) / (mM · g/mol / 1000 + 1000) · 100`.
    /// Materials with an unset concentration or molar mass yield `None`.
    pub fn weight_percent(&self) -> IndexMap<String, Option<f64>> {
        (0..self.table.nrows())
            .map(|row| {
                let name = self.table.text(row, MATERIAL).unwrap_or("").to_string();
                let value = match self.unit {
                    UnitMode::WeightPercent => self.table.number(row, "wt%"),
                    UnitMode::Millimolar => {
                        let millimolar = self.table.number(row, "mM");
                        let molar_mass = self.table.number(row, MOLAR_MASS);
                        match (millimolar, molar_mass) {
                            (Some(c), Some(m)) => {
                                let grams = c * m / 1000.0;
                                Some(grams / (grams + 1000.0) * 100.0)
                            }
                            _ => None,
                        }
                    }
                };
                (name, value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rows_are_lettered() {
        let material = SourceMaterial::new(UnitMode::WeightPercent, 3);
        assert_eq!(
            material.names(),
            &["Material A", "Material B", "Material C"]
        );
        assert_eq!(material.table().number(0, "wt%"), Some(100.0));
        assert!(material.table().cell(0, LOT).unwrap().is_unset());
    }

    #[test]
    fn resize_preserves_existing_rows() {
        let mut material = SourceMaterial::new(UnitMode::WeightPercent, 2);
        material.set_cell(0, "wt%", Cell::number(42.0)).unwrap();

        material.resize(4);
        assert_eq!(material.table().number(0, "wt%"), Some(42.0));
        assert_eq!(material.names()[3], "Material D");

        material.resize(1);
        assert_eq!(material.nrows(), 1);
        assert_eq!(material.table().number(0, "wt%"), Some(42.0));
    }

    #[test]
    fn names_refresh_only_on_real_change() {
        let mut material = SourceMaterial::new(UnitMode::WeightPercent, 2);
        assert!(!material.refresh_names());

        material
            .set_cell(1, MATERIAL, Cell::text("Salt"))
            .unwrap();
        assert_eq!(material.names(), &["Material A", "Salt"]);
        assert!(!material.refresh_names());
    }

    #[test]
    fn millimolar_mode_carries_molar_mass_column() {
        let material = SourceMaterial::new(UnitMode::Millimolar, 1);
        let names: Vec<_> = material.table().column_names().collect();
        assert_eq!(names, vec![MATERIAL, LOT, "mM", MOLAR_MASS]);
    }

    #[test]
    fn millimolar_conversion_uses_liter_basis() {
        let mut material = SourceMaterial::new(UnitMode::Millimolar, 1);
        material.set_cell(0, "mM", Cell::number(1000.0)).unwrap();
        material
            .set_cell(0, MOLAR_MASS, Cell::number(100.0))
            .unwrap();

        // 1000 mM * 100 g/mol / 1000 = 100 g per liter of solvent
        // 100 / 1100 * 100 = 9.0909... wt%
        let pct = material.weight_percent();
        let value = pct["Material A"].unwrap();
        assert!((value - 100.0 / 1100.0 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn unset_molar_mass_yields_no_concentration() {
        let mut material = SourceMaterial::new(UnitMode::Millimolar, 1);
        material.set_cell(0, "mM", Cell::number(500.0)).unwrap();
        assert_eq!(material.weight_percent()["Material A"], None);
    }
}
