//! Operator Work Logs
//!
//! A work log mirrors the column shape of its target-weight table, but
//! every non-name cell starts — and restarts — unset. Whenever anything
//! upstream recomputes, previously entered measurements are wiped: a
//! target that has changed invalidates the masses logged against it. That
//! volatility is the documented contract of these tables, not an
//! accident.
//!
//! One type serves both logs; the session instantiates it once against
//! `Weight` (keyed by composition) and once against `WeightPremixture`
//! (keyed by premixture).

use crate::error::CoreError;
use crate::table::{Cell, Table};

/// Operator log of actually-measured masses.
#[derive(Debug)]
pub struct WorkLog {
    name_column: &'static str,
    table: Table,
}

impl WorkLog {
    pub fn new(name_column: &'static str) -> Self {
        Self {
            name_column,
            table: Table::new(),
        }
    }

    pub fn name_column(&self) -> &'static str {
        self.name_column
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Mirror the target table's shape with all measurements reset to
    /// unset.
    pub fn recompute(&mut self, target: &Table) {
        let mut table = Table::new();
        for name in target.column_names() {
            let cells = if name == self.name_column {
                target.column(name).unwrap_or(&[]).to_vec()
            } else {
                vec![Cell::Unset; target.nrows()]
            };
            let _ = table.insert_column(name.to_string(), cells);
        }
        self.table = table;
    }

    /// Record a measurement.
    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> Result<(), CoreError> {
        self.table.set_cell(row, column, value)
    }

    /// Replace the whole table (snapshot restore).
    pub fn replace_table(&mut self, table: Table) -> Result<(), CoreError> {
        if !table.has_column(self.name_column) {
            return Err(CoreError::MalformedColumns(format!(
                "work log lacks a `{}` column",
                self.name_column
            )));
        }
        self.table = table;
        Ok(())
    }
}
