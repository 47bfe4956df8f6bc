//! Premixtures
//!
//! An intermediate blend of source materials, itself usable as an
//! ingredient of a composition. The table carries one numeric column per
//! current material name plus a total column whose label follows the
//! material catalog's unit mode (`TotalWeight` in grams, `TotalVolume` in
//! milliliters).
//!
//! Column reconciliation is the structural half of reactivity: whenever
//! the material name list changes, the column set is rebuilt around it —
//! existing columns keep their values by name, new materials get
//! zero-filled columns, removed materials drop out. Rows are never touched
//! by reconciliation.

use super::{alpha_lower, num_or_zero, SOLVENT, UnitMode};
use super::source_material::{SourceMaterial, MATERIAL, MOLAR_MASS};
use crate::error::CoreError;
use crate::table::{Cell, Table};

/// Name column label.
pub const PREMIXTURE: &str = "Premixture";

/// The premixture design table.
#[derive(Debug)]
pub struct PreMixture {
    nrows: usize,
    table: Table,
    names: Vec<String>,
    material_columns: Vec<String>,
    total_label: &'static str,
    ready: bool,
}

impl PreMixture {
    /// Create an empty premixture table. Columns materialize on the first
    /// reconciliation against the material catalog.
    pub fn new(nrows: usize) -> Self {
        Self {
            nrows,
            table: Table::new(),
            names: Vec::new(),
            material_columns: Vec::new(),
            total_label: "TotalWeight",
            ready: false,
        }
    }

    fn make_row(&self, index: usize) -> Vec<Cell> {
        let mut row = vec![Cell::text(alpha_lower(index))];
        row.extend(std::iter::repeat_with(|| Cell::number(0.0)).take(self.material_columns.len()));
        row.push(Cell::number(100.0));
        row
    }

    /// Rebuild the column set around the current material names, keeping
    /// existing values by name. Only structural (column) changes occur;
    /// row order and cell values are preserved exactly.
    pub fn reconcile(&mut self, material: &SourceMaterial) {
        let total = material.unit().total_label();
        // duplicate material names collapse to one column
        let mut columns: Vec<String> = Vec::with_capacity(material.names().len());
        for name in material.names() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        if !self.ready {
            self.material_columns = columns;
            self.total_label = total;
            let mut table = Table::new();
            table
                .insert_column(PREMIXTURE.to_string(), Vec::new())
                .expect("fresh column set");
            for name in &self.material_columns {
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
            let zeros = || vec![Cell::number(0.0); nrows];
            let mut rebuilt = Table::new();
            rebuilt
                .insert_column(
                    PREMIXTURE.to_string(),
                    self.table.column(PREMIXTURE).unwrap_or(&[]).to_vec(),
                )
                .expect("fresh column set");
            for name in &columns {
                if rebuilt.has_column(name) {
                    continue;
                }
                let cells = self
                    .table
                    .column(name)
                    .map(<[Cell]>::to_vec)
                    .unwrap_or_else(zeros);
                let _ = rebuilt.insert_column(name.clone(), cells);
            }
            let totals = self
                .table
                .column(self.total_label)
                .map(<[Cell]>::to_vec)
                .unwrap_or_else(|| vec![Cell::number(100.0); nrows]);
            rebuilt
                .insert_column(total.to_string(), totals)
                .expect("total column is not a material");
            self.table = rebuilt;
            self.material_columns = columns;
            self.total_label = total;
        }
        self.refresh_names();
    }

    /// Grow with default rows (`a`, `b`, ... at total 100) or truncate.
    pub fn resize(&mut self, nrows: usize) -> Result<(), CoreError> {
        if !self.ready {
            return Err(CoreError::NotReady {
                entity: crate::entities::EntityKind::PreMixture,
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

    /// Re-derive the cached premixture name list, replacing it only when
    /// content actually differs.
    pub fn refresh_names(&mut self) -> bool {
        let names: Vec<String> = (0..self.table.nrows())
            .map(|row| self.table.text(row, PREMIXTURE).unwrap_or("").to_string())
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

    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> Result<(), CoreError> {
        self.table.set_cell(row, column, value)?;
        if column == PREMIXTURE {
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

    /// Rename a material column in place (upstream rename propagation).
    pub(crate) fn rename_material_column(&mut self, old: &str, new: &str) {
        if self.table.has_column(old) {
            let _ = self.table.rename_column(old, new);
        }
    }

    /// Replace the whole table (snapshot restore).
    pub fn replace_table(&mut self, table: Table) -> Result<(), CoreError> {
        if !table.has_column(PREMIXTURE) {
            return Err(CoreError::MalformedColumns(format!(
                "premixture table lacks a `{PREMIXTURE}` column"
            )));
        }
        self.nrows = table.nrows();
        self.table = table;
        self.ready = true;
        self.refresh_names();
        Ok(())
    }

    /// The design expressed in weight-percent, with a derived `Solvent`
    /// column.
    ///
    /// In wt% mode `Solvent = 100 − Σ materials`. In mM mode each material
    /// quantity is converted through its molar mass against a 1000 mL
    /// solvent basis and an effective `TotalWeight` is derived from the
    /// total volume plus the raw quantities.
    pub fn weight_percent(&self, material: &SourceMaterial) -> Result<Table, CoreError> {
        if !self.ready {
            return Err(CoreError::NotReady {
                entity: crate::entities::EntityKind::PreMixture,
                reason: "columns not yet reconciled",
            });
        }
        weight_percent_rows(
            &self.table,
            PREMIXTURE,
            self.total_label,
            material,
            true,
        )
    }
}

/// Shared wt% projection for premixture-shaped tables (also used by
/// `Composition`, which drops its boolean columns first).
pub(super) fn weight_percent_rows(
    table: &Table,
    name_column: &str,
    total_label: &str,
    material: &SourceMaterial,
    with_solvent: bool,
) -> Result<Table, CoreError> {
    let names = material.names();
    let nrows = table.nrows();

    let mut out = Table::new();
    out.insert_column(
        name_column.to_string(),
        table.column(name_column).unwrap_or(&[]).to_vec(),
    )
    .expect("fresh column set");

    match material.unit() {
        UnitMode::WeightPercent => {
            for name in names {
                let cells = table
                    .column(name)
                    .map(<[Cell]>::to_vec)
                    .unwrap_or_else(|| vec![Cell::number(0.0); nrows]);
                let _ = out.insert_column(name.clone(), cells);
            }
            if with_solvent {
                let solvent: Vec<Cell> = (0..nrows)
                    .map(|row| {
                        let used: f64 = names.iter().map(|n| num_or_zero(table, row, n)).sum();
                        Cell::number(100.0 - used)
                    })
                    .collect();
                let _ = out.insert_column(SOLVENT.to_string(), solvent);
            }
            let totals = table
                .column(total_label)
                .map(<[Cell]>::to_vec)
                .unwrap_or_else(|| vec![Cell::Unset; nrows]);
            let _ = out.insert_column("TotalWeight".to_string(), totals);
        }
        UnitMode::Millimolar => {
            // molar mass per material, looked up by name
            let molar_mass = |name: &str| -> f64 {
                let catalog = material.table();
                (0..catalog.nrows())
                    .find(|&row| catalog.text(row, MATERIAL) == Some(name))
                    .and_then(|row| catalog.number(row, MOLAR_MASS))
                    .unwrap_or(f64::NAN)
            };

            // grams of each material per 1000 mL of solvent, per row
            let grams: Vec<Vec<f64>> = (0..nrows)
                .map(|row| {
                    names
                        .iter()
                        .map(|n| num_or_zero(table, row, n) * molar_mass(n) / 1000.0)
                        .collect()
                })
                .collect();

            for (i, name) in names.iter().enumerate() {
                let cells: Vec<Cell> = (0..nrows)
                    .map(|row| {
                        let total_grams: f64 = grams[row].iter().sum();
                        Cell::number(grams[row][i] / (total_grams + 1000.0) * 100.0)
                    })
                    .collect();
                let _ = out.insert_column(name.clone(), cells);
            }
            if with_solvent {
                let solvent: Vec<Cell> = (0..nrows)
                    .map(|row| {
                        let total_grams: f64 = grams[row].iter().sum();
                        let used: f64 = grams[row]
                            .iter()
                            .map(|g| g / (total_grams + 1000.0) * 100.0)
                            .sum();
                        Cell::number(100.0 - used)
                    })
                    .collect();
                let _ = out.insert_column(SOLVENT.to_string(), solvent);
            }
            // effective mass of the batch: solvent volume plus raw quantities
            let totals: Vec<Cell> = (0..nrows)
                .map(|row| {
                    let volume = num_or_zero(table, row, total_label);
                    let quantities: f64 = names.iter().map(|n| num_or_zero(table, row, n)).sum();
                    Cell::number(volume + quantities)
                })
                .collect();
            let _ = out.insert_column("TotalWeight".to_string(), totals);
        }
    }
    Ok(out)
}
