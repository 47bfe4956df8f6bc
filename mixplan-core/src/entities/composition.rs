//! Compositions
//!
//! Target formulations. The column set is keyed on the union of two
//! upstream name lists: one numeric column per material, one boolean
//! column per premixture (whether that premixture is selected as an
//! ingredient), plus the total column. Reconciliation therefore has two
//! independent reactive triggers and must preserve values across either.

use super::premixture::{weight_percent_rows, PreMixture};
use super::source_material::SourceMaterial;
use super::{alpha_upper, EntityKind};
use crate::error::CoreError;
use crate::table::{Cell, Table};

/// Name column label.
pub const COMPOSITION: &str = "Composition";

/// The target formulation table.
#[derive(Debug)]
pub struct Composition {
    nrows: usize,
    table: Table,
    names: Vec<String>,
    material_columns: Vec<String>,
    premixture_columns: Vec<String>,
    total_label: &'static str,
    ready: bool,
}

impl Composition {
    /// Create an empty composition table. Columns materialize on the first
    /// reconciliation against the material catalog and premixture list.
    pub fn new(nrows: usize) -> Self {
        Self {
            nrows,
            table: Table::new(),
            names: Vec::new(),
            material_columns: Vec::new(),
            premixture_columns: Vec::new(),
            total_label: "TotalWeight",
            ready: false,
        }
    }

    fn make_row(&self, index: usize) -> Vec<Cell> {
        let mut row = vec![Cell::text(alpha_upper(index))];
        row.extend(std::iter::repeat_with(|| Cell::number(0.0)).take(self.material_columns.len()));
        row.extend(std::iter::repeat(Cell::Bool(false)).take(self.premixture_columns.len()));
        row.push(Cell::number(100.0));
        row
    }

    /// Rebuild the column set around the current material and premixture
    /// names. Numeric columns keep their values by name, new materials
    /// zero-fill, new premixtures default to unselected.
    pub fn reconcile(&mut self, material: &SourceMaterial, premixture: &PreMixture) {
        let total = material.unit().total_label();
        let mut material_columns: Vec<String> = Vec::with_capacity(material.names().len());
        for name in material.names() {
            if !material_columns.contains(name) {
                material_columns.push(name.clone());
            }
        }
        let mut premixture_columns: Vec<String> = Vec::with_capacity(premixture.names().len());
        for name in premixture.names() {
            if !premixture_columns.contains(name) && !material_columns.contains(name) {
                premixture_columns.push(name.clone());
            }
        }

        if !self.ready {
            self.material_columns = material_columns;
            self.premixture_columns = premixture_columns;
            self.total_label = total;
            let mut table = Table::new();
            table
                .insert_column(COMPOSITION.to_string(), Vec::new())
                .expect("fresh column set");
            for name in self
                .material_columns
                .iter()
                .chain(&self.premixture_columns)
            {
                let _ = table.insert_column(name.clone(), Vec::new());
            }
            table
                .insert_column(total.to_string(), Vec::new())
                .expect("fresh column set");
            self.table = table;
            for i in 0..self.nrows {
                let row = self.make_row(i);
                self.table.push_row(row).expect("row arity matches columns");
            }
            self.ready = true;
        } else {
            let nrows = self.table.nrows();
            let mut rebuilt = Table::new();
            rebuilt
                .insert_column(
                    COMPOSITION.to_string(),
                    self.table.column(COMPOSITION).unwrap_or(&[]).to_vec(),
                )
                .expect("fresh column set");
            for name in &material_columns {
                let cells = self
                    .table
                    .column(name)
                    .map(<[Cell]>::to_vec)
                    .unwrap_or_else(|| vec![Cell::number(0.0); nrows]);
                let _ = rebuilt.insert_column(name.clone(), cells);
            }
            for name in &premixture_columns {
                let cells = self
                    .table
                    .column(name)
                    .map(<[Cell]>::to_vec)
                    .unwrap_or_else(|| vec![Cell::Bool(false); nrows]);
                let _ = rebuilt.insert_column(name.clone(), cells);
            }
            let totals = self
                .table
                .column(self.total_label)
                .map(<[Cell]>::to_vec)
                .unwrap_or_else(|| vec![Cell::number(100.0); nrows]);
            rebuilt
                .insert_column(total.to_string(), totals)
                .expect("total column is distinct");
            self.table = rebuilt;
            self.material_columns = material_columns;
            self.premixture_columns = premixture_columns;
            self.total_label = total;
        }
        self.refresh_names();
    }

    /// Grow with default rows (`A`, `B`, ... at total 100) or truncate.
    pub fn resize(&mut self, nrows: usize) -> Result<(), CoreError> {
        if !self.ready {
            return Err(CoreError::NotReady {
                entity: EntityKind::Composition,
                reason: "columns not yet reconciled",
            });
        }
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
        Ok(())
    }

    pub fn refresh_names(&mut self) -> bool {
        let names: Vec<String> = (0..self.table.nrows())
            .map(|row| self.table.text(row, COMPOSITION).unwrap_or("").to_string())
            .collect();
        if names == self.names {
            return false;
        }
        self.names = names;
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn total_label(&self) -> &'static str {
        self.total_label
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether any composition row selects any premixture.
    pub fn any_premixture_selected(&self) -> bool {
        self.premixture_columns.iter().any(|name| {
            (0..self.table.nrows()).any(|row| self.table.boolean(row, name) == Some(true))
        })
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> Result<(), CoreError> {
        self.table.set_cell(row, column, value)?;
        if column == COMPOSITION {
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

    /// Rename a material or premixture column in place (upstream rename
    /// propagation).
    pub(crate) fn rename_ingredient_column(&mut self, old: &str, new: &str) {
        if self.table.has_column(old) {
            let _ = self.table.rename_column(old, new);
            for columns in [&mut self.material_columns, &mut self.premixture_columns] {
                if let Some(slot) = columns.iter_mut().find(|name| *name == old) {
                    *slot = new.to_string();
                }
            }
        }
    }

    /// Replace the whole table (snapshot restore).
    pub fn replace_table(&mut self, table: Table) -> Result<(), CoreError> {
        if !table.has_column(COMPOSITION) {
            return Err(CoreError::MalformedColumns(format!(
                "composition table lacks a `{COMPOSITION}` column"
            )));
        }
        self.nrows = table.nrows();
        self.table = table;
        self.ready = true;
        self.refresh_names();
        Ok(())
    }

    /// The targets in weight-percent: the premixture selection columns are
    /// dropped and, in mM mode, material concentrations are converted like
    /// a premixture's.
    pub fn weight_percent(&self, material: &SourceMaterial) -> Result<Table, CoreError> {
        if !self.ready {
            return Err(CoreError::NotReady {
                entity: EntityKind::Composition,
                reason: "columns not yet reconciled",
            });
        }
        weight_percent_rows(&self.table, COMPOSITION, self.total_label, material, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::UnitMode;

    fn pipeline() -> (SourceMaterial, PreMixture, Composition) {
        let material = SourceMaterial::new(UnitMode::WeightPercent, 3);
        let mut premixture = PreMixture::new(2);
        premixture.reconcile(&material);
        let mut composition = Composition::new(3);
        composition.reconcile(&material, &premixture);
        (material, premixture, composition)
    }

    #[test]
    fn columns_are_materials_then_premixtures_then_total() {
        let (_, _, composition) = pipeline();
        let names: Vec<_> = composition.table().column_names().collect();
        assert_eq!(
            names,
            vec![
                COMPOSITION,
                "Material A",
                "Material B",
                "Material C",
                "a",
                "b",
                "TotalWeight"
            ]
        );
        assert_eq!(composition.names(), &["A", "B", "C"]);
        assert_eq!(composition.table().boolean(0, "a"), Some(false));
    }

    #[test]
    fn new_premixture_column_defaults_false_and_values_survive() {
        let (material, mut premixture, mut composition) = pipeline();
        composition
            .set_cell(1, "Material A", Cell::number(10.0))
            .unwrap();
        composition.set_cell(1, "a", Cell::Bool(true)).unwrap();

        premixture.resize(3).unwrap();
        composition.reconcile(&material, &premixture);

        assert_eq!(composition.table().number(1, "Material A"), Some(10.0));
        assert_eq!(composition.table().boolean(1, "a"), Some(true));
        assert_eq!(composition.table().boolean(1, "c"), Some(false));
    }

    #[test]
    fn selection_flag_detection() {
        let (_, _, mut composition) = pipeline();
        assert!(!composition.any_premixture_selected());
        composition.set_cell(2, "b", Cell::Bool(true)).unwrap();
        assert!(composition.any_premixture_selected());
    }

    #[test]
    fn weight_percent_drops_selection_columns() {
        let (material, _, mut composition) = pipeline();
        composition.set_cell(0, "a", Cell::Bool(true)).unwrap();
        let pct = composition.weight_percent(&material).unwrap();
        assert!(!pct.has_column("a"));
        assert!(!pct.has_column("b"));
        assert!(pct.has_column("Material A"));
        assert_eq!(pct.number(0, "TotalWeight"), Some(100.0));
    }
}
