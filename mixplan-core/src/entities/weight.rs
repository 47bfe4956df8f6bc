//! Target Weights
//!
//! The mass-balance solver: how much of each (possibly diluted) stock
//! material, each premixture, and solvent to physically weigh out so a
//! composition row hits its targets.
//!
//! For each composition row:
//!
//! 1. Target mass per material = `wt% × total / 100`.
//! 2. If premixtures are selected, back-solve how much of each to use
//!    (see [`allocate_premixtures`]) and subtract their contribution.
//! 3. The remaining shortfall per material is converted to stock mass by
//!    dividing through the material's own stock concentration.
//! 4. Solvent is the residual of the mass balance: the shortfall sum
//!    before stock correction minus the corrected sum — never an
//!    independently computed quantity.
//! 5. Everything is rounded to the configured `digit`.
//!
//! Divisions that produce NaN or an infinity are business-ruled, not
//! errors: allocation ratios become non-limiting, corrected masses become
//! unset cells.

use indexmap::IndexMap;
use tracing::trace;

use super::composition::{Composition, COMPOSITION};
use super::premixture::{PreMixture, PREMIXTURE};
use super::source_material::SourceMaterial;
use super::{dedup_names, num_or_zero, round_to, SOLVENT};
use crate::error::CoreError;
use crate::table::{Cell, Table};

/// Per-composition premixture allocation.
struct Allocation {
    /// Material (and solvent) mass supplied by premixtures, per
    /// composition row; last slot is the solvent share.
    contribution: Vec<Vec<f64>>,
    /// Fraction (0–100) of each premixture's unit batch consumed, per
    /// composition row × premixture row.
    fractions: Vec<Vec<f64>>,
}

/// Back-solve premixture usage from overlapping ingredient constraints.
///
/// For each premixture and composition that selects it, the limiting ratio
/// is the minimum over supplied materials of
/// `required shortfall ÷ per-unit content`. Ratios that come out zero,
/// NaN, or infinite are non-limiting and skipped; if no ratio survives,
/// nothing of that premixture is consumed. The limiting ratio times the
/// premixture's own percent composition is its contribution; contributions
/// from premixtures sharing a material are summed.
fn allocate_premixtures(
    targets: &[Vec<f64>],
    material_names: &[String],
    composition: &Table,
    premixture: &PreMixture,
    premixture_pct: &Table,
) -> Allocation {
    let premix_names = premixture.names();
    let ncomp = targets.len();
    let nmat = material_names.len();

    let mut contribution = vec![vec![0.0; nmat + 1]; ncomp];
    let mut fractions = vec![vec![0.0; premix_names.len()]; ncomp];

    for (p, premix_name) in premix_names.iter().enumerate() {
        for c in 0..ncomp {
            if composition.boolean(c, premix_name) != Some(true) {
                continue;
            }
            let mut limiting: Option<f64> = None;
            for (m, material_name) in material_names.iter().enumerate() {
                let per_unit = num_or_zero(premixture.table(), p, material_name);
                let ratio = targets[c][m] / per_unit;
                if ratio.is_finite() && ratio > 0.0 {
                    limiting = Some(limiting.map_or(ratio, |best: f64| best.min(ratio)));
                }
            }
            // no satisfiable constraint: the premixture is not consumed
            let factor = limiting.unwrap_or(0.0);
            fractions[c][p] = factor * 100.0;
            for (m, material_name) in material_names.iter().enumerate() {
                contribution[c][m] += factor * num_or_zero(premixture_pct, p, material_name);
            }
            contribution[c][nmat] += factor * num_or_zero(premixture_pct, p, SOLVENT);
        }
    }

    Allocation {
        contribution,
        fractions,
    }
}

/// Convert per-material shortfalls into stock masses and derive the
/// solvent residual, rounding to `digit`.
///
/// Returns `(corrected material cells, solvent cell)` per row. A shortfall
/// divided by a missing or zero stock concentration yields an unset cell
/// and is excluded from the residual.
fn stock_correction(
    lack: &[f64],
    lack_solvent: f64,
    material_names: &[String],
    stock: &IndexMap<String, Option<f64>>,
    digit: u32,
) -> (Vec<Cell>, Cell) {
    let mut corrected = Vec::with_capacity(material_names.len());
    let mut corrected_sum = 0.0;
    for (m, name) in material_names.iter().enumerate() {
        let concentration = stock.get(name).copied().flatten().unwrap_or(f64::NAN);
        let mass = lack[m] / concentration * 100.0;
        if mass.is_finite() {
            corrected_sum += mass;
        }
        corrected.push(Cell::number(round_to(mass, digit)));
    }
    let lack_sum: f64 = lack.iter().sum::<f64>() + lack_solvent;
    let solvent = Cell::number(round_to(lack_sum - corrected_sum, digit));
    (corrected, solvent)
}

/// Target weights per composition.
#[derive(Debug)]
pub struct Weight {
    digit: u32,
    table: Table,
    ready: bool,
}

impl Weight {
    pub fn new(digit: u32) -> Self {
        Self {
            digit,
            table: Table::new(),
            ready: false,
        }
    }

    pub fn digit(&self) -> u32 {
        self.digit
    }

    pub fn set_digit(&mut self, digit: u32) {
        self.digit = digit;
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Re-derive the full target-weight table.
    pub fn recompute(
        &mut self,
        composition: &Composition,
        premixture: &PreMixture,
        material: &SourceMaterial,
    ) -> Result<(), CoreError> {
        let comp_pct = composition.weight_percent(material)?;
        let material_names = dedup_names(material.names());
        let premix_names = premixture.names();
        let nrows = comp_pct.nrows();
        let nmat = material_names.len();

        let totals: Vec<f64> = (0..nrows)
            .map(|row| num_or_zero(&comp_pct, row, "TotalWeight"))
            .collect();

        // step 1: target mass per material
        let targets: Vec<Vec<f64>> = (0..nrows)
            .map(|row| {
                material_names
                    .iter()
                    .map(|name| num_or_zero(&comp_pct, row, name) * totals[row] / 100.0)
                    .collect()
            })
            .collect();

        // step 2: premixture allocation
        let allocation = if composition.any_premixture_selected() {
            let premixture_pct = premixture.weight_percent(material)?;
            Some(allocate_premixtures(
                &targets,
                &material_names,
                composition.table(),
                premixture,
                &premixture_pct,
            ))
        } else {
            None
        };

        // steps 3–5: shortfall, stock correction, solvent residual
        let mut table = Table::new();
        table
            .insert_column(
                COMPOSITION.to_string(),
                comp_pct.column(COMPOSITION).unwrap_or(&[]).to_vec(),
            )
            .expect("fresh column set");
        let mut material_cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(nrows); nmat];
        let mut solvent_cells: Vec<Cell> = Vec::with_capacity(nrows);
        let stock = material.weight_percent();

        for row in 0..nrows {
            let contribution = allocation.as_ref().map(|a| a.contribution[row].as_slice());
            let lack: Vec<f64> = (0..nmat)
                .map(|m| targets[row][m] - contribution.map_or(0.0, |c| c[m]))
                .collect();
            let solvent_target = totals[row] - targets[row].iter().sum::<f64>();
            let lack_solvent = solvent_target - contribution.map_or(0.0, |c| c[nmat]);

            let (corrected, solvent) =
                stock_correction(&lack, lack_solvent, &material_names, &stock, self.digit);
            for (m, cell) in corrected.into_iter().enumerate() {
                material_cells[m].push(cell);
            }
            solvent_cells.push(solvent);
        }

        for (m, name) in material_names.iter().enumerate() {
            let _ = table.insert_column(name.clone(), std::mem::take(&mut material_cells[m]));
        }
        for (p, name) in premix_names.iter().enumerate() {
            let cells: Vec<Cell> = (0..nrows)
                .map(|row| match &allocation {
                    Some(a) => Cell::number(round_to(a.fractions[row][p], self.digit)),
                    None => Cell::Unset,
                })
                .collect();
            let _ = table.insert_column(name.clone(), cells);
        }
        let _ = table.insert_column(SOLVENT.to_string(), solvent_cells);

        trace!(rows = nrows, "target weights recomputed");
        self.table = table;
        self.ready = true;
        Ok(())
    }
}

/// Target weights per premixture batch: the same mass balance with the
/// premixture contribution fixed at zero.
#[derive(Debug)]
pub struct WeightPremixture {
    digit: u32,
    table: Table,
    ready: bool,
}

impl WeightPremixture {
    pub fn new(digit: u32) -> Self {
        Self {
            digit,
            table: Table::new(),
            ready: false,
        }
    }

    pub fn digit(&self) -> u32 {
        self.digit
    }

    pub fn set_digit(&mut self, digit: u32) {
        self.digit = digit;
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn recompute(
        &mut self,
        premixture: &PreMixture,
        material: &SourceMaterial,
    ) -> Result<(), CoreError> {
        let pct = premixture.weight_percent(material)?;
        let material_names = dedup_names(material.names());
        let nrows = pct.nrows();
        let nmat = material_names.len();
        let stock = material.weight_percent();

        let mut table = Table::new();
        table
            .insert_column(
                PREMIXTURE.to_string(),
                pct.column(PREMIXTURE).unwrap_or(&[]).to_vec(),
            )
            .expect("fresh column set");
        let mut material_cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(nrows); nmat];
        let mut solvent_cells: Vec<Cell> = Vec::with_capacity(nrows);

        for row in 0..nrows {
            let total = num_or_zero(&pct, row, "TotalWeight");
            let lack: Vec<f64> = material_names
                .iter()
                .map(|name| num_or_zero(&pct, row, name) * total / 100.0)
                .collect();
            let lack_solvent = total - lack.iter().sum::<f64>();

            let (corrected, solvent) =
                stock_correction(&lack, lack_solvent, &material_names, &stock, self.digit);
            for (m, cell) in corrected.into_iter().enumerate() {
                material_cells[m].push(cell);
            }
            solvent_cells.push(solvent);
        }

        for (m, name) in material_names.iter().enumerate() {
            let _ = table.insert_column(name.clone(), std::mem::take(&mut material_cells[m]));
        }
        let _ = table.insert_column(SOLVENT.to_string(), solvent_cells);

        self.table = table;
        self.ready = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::UnitMode;
    use crate::table::Cell;

    fn pipeline() -> (SourceMaterial, PreMixture, Composition) {
        let mut material = SourceMaterial::new(UnitMode::WeightPercent, 3);
        material
            .set_cell(0, "wt%", Cell::number(100.0))
            .unwrap();
        material.set_cell(1, "wt%", Cell::number(50.0)).unwrap();
        material.set_cell(2, "wt%", Cell::number(1.0)).unwrap();
        let mut premixture = PreMixture::new(2);
        premixture.reconcile(&material);
        let mut composition = Composition::new(3);
        composition.reconcile(&material, &premixture);
        (material, premixture, composition)
    }

    #[test]
    fn dilute_stock_is_scaled_up_and_solvent_is_the_residual() {
        let (material, premixture, mut composition) = pipeline();
        // Composition B: 10% of Material A, 10% of Material B, total 200
        composition
            .set_cell(1, "Material A", Cell::number(10.0))
            .unwrap();
        composition
            .set_cell(1, "Material B", Cell::number(10.0))
            .unwrap();
        composition
            .set_cell(1, "TotalWeight", Cell::number(200.0))
            .unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        let table = weight.table();
        assert_eq!(table.number(1, "Material A"), Some(20.0));
        // Material B stock is 50 wt%, so twice the shortfall is weighed out
        assert_eq!(table.number(1, "Material B"), Some(40.0));
        assert_eq!(table.number(1, "Material C"), Some(0.0));
        // residual: (20 + 20 + 0 + 160) - (20 + 40 + 0)
        assert_eq!(table.number(1, SOLVENT), Some(140.0));
    }

    #[test]
    fn mass_balance_round_trips_without_premixtures() {
        let (material, premixture, mut composition) = pipeline();
        composition
            .set_cell(0, "Material A", Cell::number(25.0))
            .unwrap();
        composition
            .set_cell(0, "TotalWeight", Cell::number(80.0))
            .unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        // only Material A is drawn on: masses plus solvent equal the total
        let table = weight.table();
        let sum = table.number(0, "Material A").unwrap()
            + table.number(0, "Material B").unwrap()
            + table.number(0, "Material C").unwrap()
            + table.number(0, SOLVENT).unwrap();
        assert!((sum - 80.0).abs() < 1e-9);
    }

    #[test]
    fn premixture_fraction_covers_the_limiting_material() {
        let (material, mut premixture, mut composition) = pipeline();
        // premixture `a` supplies 20 units of Material A per unit batch
        premixture
            .set_cell(0, "Material A", Cell::number(20.0))
            .unwrap();
        // two compositions draw different amounts of Material A from it
        composition
            .set_cell(0, "Material A", Cell::number(10.0))
            .unwrap();
        composition.set_cell(0, "a", Cell::Bool(true)).unwrap();
        composition
            .set_cell(1, "Material A", Cell::number(5.0))
            .unwrap();
        composition.set_cell(1, "a", Cell::Bool(true)).unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        let table = weight.table();
        // row A needs 10 g of Material A; 10 / 20 = 0.5 unit batches
        assert_eq!(table.number(0, "a"), Some(50.0));
        // row B needs 5 g: a quarter batch
        assert_eq!(table.number(1, "a"), Some(25.0));
        // consumption fraction times per-unit content equals the requested mass
        assert!((0.5_f64 * 20.0 - 10.0).abs() < 1e-9);
        // the premixture fully covers Material A, nothing weighed directly
        assert_eq!(table.number(0, "Material A"), Some(0.0));
        // unselected premixture stays at zero consumption
        assert_eq!(table.number(0, "b"), Some(0.0));
    }

    #[test]
    fn limiting_material_determines_the_ratio() {
        let (material, mut premixture, mut composition) = pipeline();
        // premixture `a` supplies Material A and B at different strengths
        premixture
            .set_cell(0, "Material A", Cell::number(20.0))
            .unwrap();
        premixture
            .set_cell(0, "Material B", Cell::number(40.0))
            .unwrap();
        composition
            .set_cell(0, "Material A", Cell::number(10.0))
            .unwrap();
        composition
            .set_cell(0, "Material B", Cell::number(10.0))
            .unwrap();
        composition.set_cell(0, "a", Cell::Bool(true)).unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        // Material B limits: 10 / 40 = 0.25 unit batches
        assert_eq!(weight.table().number(0, "a"), Some(25.0));
        // Material A shortfall: 10 - 0.25 * 20 = 5, at 100 wt% stock
        assert_eq!(weight.table().number(0, "Material A"), Some(5.0));
        // Material B fully covered, stock correction sees zero shortfall
        assert_eq!(weight.table().number(0, "Material B"), Some(0.0));
    }

    #[test]
    fn zero_and_undefined_ratios_are_non_limiting() {
        let (material, mut premixture, mut composition) = pipeline();
        premixture
            .set_cell(0, "Material A", Cell::number(20.0))
            .unwrap();
        // Material B per-unit content is zero: required / 0 must be skipped
        composition
            .set_cell(0, "Material A", Cell::number(10.0))
            .unwrap();
        composition
            .set_cell(0, "Material B", Cell::number(10.0))
            .unwrap();
        composition.set_cell(0, "a", Cell::Bool(true)).unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        assert_eq!(weight.table().number(0, "a"), Some(50.0));
    }

    #[test]
    fn selected_premixture_with_no_overlap_is_unused() {
        let (material, premixture, mut composition) = pipeline();
        // premixture `a` supplies nothing (all-zero row)
        composition.set_cell(0, "a", Cell::Bool(true)).unwrap();
        composition
            .set_cell(0, "Material A", Cell::number(10.0))
            .unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();

        assert_eq!(weight.table().number(0, "a"), Some(0.0));
        assert_eq!(weight.table().number(0, "Material A"), Some(10.0));
    }

    #[test]
    fn premixture_columns_unset_when_nothing_selected() {
        let (material, premixture, composition) = pipeline();
        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();
        assert!(weight.table().cell(0, "a").unwrap().is_unset());
    }

    #[test]
    fn recompute_is_idempotent() {
        let (material, premixture, mut composition) = pipeline();
        composition
            .set_cell(0, "Material B", Cell::number(12.5))
            .unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();
        let first = weight.table().clone();
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();
        assert_eq!(weight.table(), &first);
    }

    #[test]
    fn premixture_batch_weights_follow_the_same_balance() {
        let (material, mut premixture, _) = pipeline();
        premixture
            .set_cell(0, "Material B", Cell::number(20.0))
            .unwrap();
        premixture
            .set_cell(0, "TotalWeight", Cell::number(500.0))
            .unwrap();

        let mut weight = WeightPremixture::new(2);
        weight.recompute(&premixture, &material).unwrap();

        // 20% of 500 = 100 g target at 50 wt% stock => 200 g weighed
        assert_eq!(weight.table().number(0, "Material B"), Some(200.0));
        // residual: (0 + 100 + 0 + 400) - (0 + 200 + 0)
        assert_eq!(weight.table().number(0, SOLVENT), Some(300.0));
    }

    #[test]
    fn unknown_stock_concentration_yields_unset_mass() {
        let (mut material, premixture, mut composition) = pipeline();
        material.set_cell(2, "wt%", Cell::Unset).unwrap();
        composition
            .set_cell(0, "Material C", Cell::number(5.0))
            .unwrap();

        let mut weight = Weight::new(2);
        weight
            .recompute(&composition, &premixture, &material)
            .unwrap();
        assert!(weight.table().cell(0, "Material C").unwrap().is_unset());
    }
}
