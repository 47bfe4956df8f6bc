//! Resulting Concentrations
//!
//! What actually ended up in the flask, computed from the operator's
//! measured masses rather than the designed targets.
//!
//! Unset measurements propagate: a concentration that depends solely on a
//! measurement that was never logged is unset, never silently zero. The
//! one deliberate exception is the premixture term of a composition's
//! result, where missing values are summed as zero so a partially logged
//! session still produces the concentrations it can support.

use super::composition::{Composition, COMPOSITION};
use super::premixture::PreMixture;
use super::source_material::SourceMaterial;
use super::work::WorkLog;
use super::{dedup_names, num_or_zero};
use crate::table::{Cell, Table};

/// Sum of all numeric cells in a row, unset skipped. `None` when the sum
/// is zero — a total of nothing cannot normalize anything.
fn measured_total(table: &Table, row: usize) -> Option<f64> {
    let total: f64 = table
        .column_names()
        .map(|name| num_or_zero(table, row, name))
        .sum();
    (total != 0.0).then_some(total)
}

/// Resulting weight-percent of each premixture batch.
#[derive(Debug, Default)]
pub struct PremixtureResult {
    table: Table,
}

impl PremixtureResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// For each premixture row: `measured mass × stock wt% ÷ total
    /// measured mass`, per material.
    pub fn recompute(&mut self, work: &WorkLog, material: &SourceMaterial) {
        let names = dedup_names(material.names());
        let stock = material.weight_percent();
        let log = work.table();
        let nrows = log.nrows();

        let mut table = Table::new();
        table
            .insert_column(
                work.name_column().to_string(),
                log.column(work.name_column()).unwrap_or(&[]).to_vec(),
            )
            .expect("fresh column set");

        for name in &names {
            let concentration = stock.get(name).copied().flatten();
            let cells: Vec<Cell> = (0..nrows)
                .map(|row| {
                    match (log.number(row, name), concentration, measured_total(log, row)) {
                        (Some(measured), Some(pct), Some(total)) => {
                            Cell::number(measured * pct / total)
                        }
                        _ => Cell::Unset,
                    }
                })
                .collect();
            let _ = table.insert_column(name.clone(), cells);
        }
        self.table = table;
    }
}

/// Resulting weight-percent of each composition.
#[derive(Debug, Default)]
pub struct CompositionResult {
    table: Table,
}

impl CompositionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Combine directly weighed material with material carried in by the
    /// selected premixtures, then normalize by the total measured mass.
    pub fn recompute(
        &mut self,
        work: &WorkLog,
        composition: &Composition,
        premixture: &PreMixture,
        material: &SourceMaterial,
        premixture_result: &PremixtureResult,
    ) {
        let names = dedup_names(material.names());
        let premix_names = premixture.names();
        let stock = material.weight_percent();
        let log = work.table();
        let nrows = log.nrows();

        let mut table = Table::new();
        table
            .insert_column(
                COMPOSITION.to_string(),
                log.column(COMPOSITION).unwrap_or(&[]).to_vec(),
            )
            .expect("fresh column set");

        for name in &names {
            let concentration = stock.get(name).copied().flatten();
            let cells: Vec<Cell> = (0..nrows)
                .map(|row| {
                    let total = match measured_total(log, row) {
                        Some(total) => total,
                        None => return Cell::Unset,
                    };

                    // premixture-sourced share; missing values count as zero
                    let mut carried = 0.0;
                    let mut any_carried = false;
                    for (p, premix_name) in premix_names.iter().enumerate() {
                        if composition.table().boolean(row, premix_name) != Some(true) {
                            continue;
                        }
                        if let (Some(measured), Some(pct)) = (
                            log.number(row, premix_name),
                            premixture_result.table().number(p, name),
                        ) {
                            carried += measured * pct;
                            any_carried = true;
                        }
                    }

                    // directly weighed share
                    let direct = match (log.number(row, name), concentration) {
                        (Some(measured), Some(pct)) => Some(measured * pct),
                        _ => None,
                    };

                    match (direct, any_carried) {
                        (Some(direct), _) => Cell::number((carried + direct) / total),
                        (None, true) => Cell::number(carried / total),
                        (None, false) => Cell::Unset,
                    }
                })
                .collect();
            let _ = table.insert_column(name.clone(), cells);
        }
        self.table = table;
    }
}
