//! Tables
//!
//! Every entity in the pipeline owns exactly one [`Table`]: an ordered
//! sequence of rows over a set of named, typed columns. Row identity is
//! positional; column identity is by name. Structural changes (adding,
//! removing, renaming, reordering columns) always go through names, never
//! positional indices, so a column keeps its data across any upstream
//! rename or reshuffle.
//!
//! # Cells
//!
//! A cell is a number, free text, a boolean, or [`Cell::Unset`]. Unset is a
//! first-class value, not an error: operator logs start out entirely unset,
//! and arithmetic that would produce NaN or an infinity is normalized to
//! unset at the cell boundary so non-finite floats never enter a table.
//!
//! # Serialization
//!
//! Tables convert to and from row-oriented JSON records (one object per
//! row, keyed by column name), the shape consumed by the external save/load
//! collaborator. `Unset` maps to JSON `null`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Bool(bool),
    Number(f64),
    Text(String),
    Unset,
}

impl Cell {
    /// Build a numeric cell, normalizing non-finite values to `Unset`.
    ///
    /// This is the single point where NaN/infinity sentinels are converted;
    /// every computed value goes through it.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Unset
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Cell::Unset)
    }
}

/// An ordered set of named columns, all the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: IndexMap<String, Vec<Cell>>,
}

impl Table {
    /// Create an empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, column)` pairs.
    ///
    /// Fails if column lengths differ or a name repeats.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<Cell>)>,
    ) -> Result<Self, CoreError> {
        let mut table = Table::new();
        for (name, cells) in columns {
            table.insert_column(name, cells)?;
        }
        Ok(table)
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, |(_, col)| col.len())
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        self.columns.get(column).and_then(|col| col.get(row))
    }

    /// Numeric value at `(row, column)`; `None` for unset, non-numeric, or
    /// out-of-range cells.
    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.cell(row, column).and_then(Cell::as_number)
    }

    pub fn boolean(&self, row: usize, column: &str) -> Option<bool> {
        self.cell(row, column).and_then(Cell::as_bool)
    }

    pub fn text(&self, row: usize, column: &str) -> Option<&str> {
        self.cell(row, column).and_then(Cell::as_text)
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> Result<(), CoreError> {
        let nrows = self.nrows();
        let col = self
            .columns
            .get_mut(column)
            .ok_or_else(|| CoreError::UnknownColumn(column.to_string()))?;
        let cell = col
            .get_mut(row)
            .ok_or(CoreError::RowOutOfBounds { row, nrows })?;
        *cell = value;
        Ok(())
    }

    /// Append a row. The cell count must match the column count, in column
    /// order.
    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<(), CoreError> {
        if cells.len() != self.ncols() {
            return Err(CoreError::MalformedColumns(format!(
                "row of {} cells pushed onto {} columns",
                cells.len(),
                self.ncols()
            )));
        }
        for (col, cell) in self.columns.values_mut().zip(cells) {
            col.push(cell);
        }
        Ok(())
    }

    pub fn remove_row(&mut self, row: usize) -> Result<(), CoreError> {
        let nrows = self.nrows();
        if row >= nrows {
            return Err(CoreError::RowOutOfBounds { row, nrows });
        }
        for col in self.columns.values_mut() {
            col.remove(row);
        }
        Ok(())
    }

    /// Drop all rows past `nrows`, preserving the first `nrows` unchanged.
    pub fn truncate(&mut self, nrows: usize) {
        for col in self.columns.values_mut() {
            col.truncate(nrows);
        }
    }

    /// Append a column. Its length must match the current row count (any
    /// length is accepted for the first column).
    pub fn insert_column(&mut self, name: String, cells: Vec<Cell>) -> Result<(), CoreError> {
        if !self.is_empty() && cells.len() != self.nrows() {
            return Err(CoreError::MalformedColumns(format!(
                "column `{name}` has {} cells, table has {} rows",
                cells.len(),
                self.nrows()
            )));
        }
        if self.columns.contains_key(&name) {
            return Err(CoreError::MalformedColumns(format!(
                "duplicate column `{name}`"
            )));
        }
        self.columns.insert(name, cells);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Cell>> {
        self.columns.shift_remove(name)
    }

    /// Rename a column in place, keeping its position and data.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), CoreError> {
        if !self.columns.contains_key(old) {
            return Err(CoreError::UnknownColumn(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if self.columns.contains_key(new) {
            return Err(CoreError::MalformedColumns(format!(
                "duplicate column `{new}`"
            )));
        }
        let renamed: IndexMap<String, Vec<Cell>> = self
            .columns
            .drain(..)
            .map(|(name, col)| {
                if name == old {
                    (new.to_string(), col)
                } else {
                    (name, col)
                }
            })
            .collect();
        self.columns = renamed;
        Ok(())
    }

    /// Reorder columns to the given name sequence, dropping any column not
    /// listed. Listed names missing from the table are skipped.
    pub fn reindex<'a>(&mut self, order: impl IntoIterator<Item = &'a str>) {
        let mut reordered = IndexMap::with_capacity(self.columns.len());
        for name in order {
            if let Some(col) = self.columns.shift_remove(name) {
                reordered.insert(name.to_string(), col);
            }
        }
        self.columns = reordered;
    }

    /// Encode as row-oriented records: one JSON object per row, keyed by
    /// column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.nrows())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|(name, col)| {
                        let value = serde_json::to_value(&col[row]).unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }

    /// Decode from row-oriented records. Column order follows first
    /// appearance; keys missing from a record become unset cells.
    pub fn from_records(records: &[Map<String, Value>]) -> Result<Self, CoreError> {
        let mut order: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !order.iter().any(|k| k == key) {
                    order.push(key.clone());
                }
            }
        }
        let mut table = Table::new();
        for name in order {
            let mut cells = Vec::with_capacity(records.len());
            for record in records {
                let cell = match record.get(&name) {
                    Some(value) => serde_json::from_value(value.clone())?,
                    None => Cell::Unset,
                };
                cells.push(cell);
            }
            table.insert_column(name, cells)?;
        }
        Ok(table)
    }
}
