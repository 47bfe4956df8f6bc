//! Sessions
//!
//! A [`Session`] owns one instance of every tabular entity, the dependency
//! graph wiring them together, and the subscriber registry. All mutation
//! goes through the session: it writes the owning entity, asks the graph
//! which dependents are affected, recomputes them in topological order,
//! and notifies subscribers of every table that changed — synchronously,
//! within the mutating call.
//!
//! One pass runs at a time. The mutation entry points fail with
//! [`CoreError::Reentrant`] if a pass is already active, so an embedder
//! driving the session from multiple actors must serialize writes — most
//! easily through a [`SharedSession`].

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::entities::{
    Composition, CompositionResult, EntityKind, PreMixture, PremixtureResult, SourceMaterial,
    UnitMode, Weight, WeightPremixture, WorkLog, COMPOSITION, MATERIAL, PREMIXTURE,
};
use crate::error::CoreError;
use crate::graph::{DependencyGraph, Node, NodeId};
use crate::table::{Cell, Table};

/// Shared handle for embedders with more than one writer. The lock is the
/// session's single evaluation queue.
pub type SharedSession = Arc<RwLock<Session>>;

/// Handle returned by [`Session::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Callback = Box<dyn Fn(&Table) + Send + Sync>;

struct Subscriber {
    id: SubscriberId,
    kind: EntityKind,
    callback: Callback,
}

const DEFAULT_MATERIAL_ROWS: usize = 3;
const DEFAULT_PREMIXTURE_ROWS: usize = 1;
const DEFAULT_COMPOSITION_ROWS: usize = 3;
const DEFAULT_DIGIT: u32 = 2;
const DEFAULT_THRESHOLD: f64 = 0.01;

/// One complete mixture-preparation pipeline.
pub struct Session {
    material: SourceMaterial,
    premixture: PreMixture,
    composition: Composition,
    weight: Weight,
    weight_premixture: WeightPremixture,
    work: WorkLog,
    work_premixture: WorkLog,
    result: CompositionResult,
    result_premixture: PremixtureResult,

    graph: DependencyGraph,
    nodes: IndexMap<EntityKind, NodeId>,
    propagating: bool,

    threshold: f64,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

impl Session {
    /// Build a session in the given unit mode and run the initial
    /// propagation so every derived table is populated.
    pub fn new(unit: UnitMode) -> Result<Self, CoreError> {
        let mut graph = DependencyGraph::new();
        let mut nodes = IndexMap::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            nodes.insert(kind, graph.add_node(Node::new()));
        }

        for (dependency, dependent) in [
            (EntityKind::SourceMaterial, EntityKind::PreMixture),
            (EntityKind::SourceMaterial, EntityKind::Composition),
            (EntityKind::PreMixture, EntityKind::Composition),
            (EntityKind::SourceMaterial, EntityKind::Weight),
            (EntityKind::PreMixture, EntityKind::Weight),
            (EntityKind::Composition, EntityKind::Weight),
            (EntityKind::SourceMaterial, EntityKind::WeightPremixture),
            (EntityKind::PreMixture, EntityKind::WeightPremixture),
            (EntityKind::Weight, EntityKind::Work),
            (EntityKind::WeightPremixture, EntityKind::WorkPremixture),
            (EntityKind::WorkPremixture, EntityKind::ResultPremixture),
            (EntityKind::Work, EntityKind::Result),
            (EntityKind::ResultPremixture, EntityKind::Result),
        ] {
            graph.add_edge(nodes[&dependency], nodes[&dependent]);
        }
        graph.validate_acyclic()?;

        let mut session = Self {
            material: SourceMaterial::new(unit, DEFAULT_MATERIAL_ROWS),
            premixture: PreMixture::new(DEFAULT_PREMIXTURE_ROWS),
            composition: Composition::new(DEFAULT_COMPOSITION_ROWS),
            weight: Weight::new(DEFAULT_DIGIT),
            weight_premixture: WeightPremixture::new(DEFAULT_DIGIT),
            work: WorkLog::new(COMPOSITION),
            work_premixture: WorkLog::new(PREMIXTURE),
            result: CompositionResult::new(),
            result_premixture: PremixtureResult::new(),
            graph,
            nodes,
            propagating: false,
            threshold: DEFAULT_THRESHOLD,
            subscribers: Vec::new(),
            next_subscriber: 0,
        };
        session.propagate_from(EntityKind::SourceMaterial)?;
        Ok(session)
    }

    // ------------------------------------------------------------------
    // read surface

    pub fn unit(&self) -> UnitMode {
        self.material.unit()
    }

    pub fn digit(&self) -> u32 {
        self.weight.digit()
    }

    /// Presentation tolerance for deviation highlighting. Stored
    /// configuration only; the core does not consume it.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn table(&self, kind: EntityKind) -> &Table {
        match kind {
            EntityKind::SourceMaterial => self.material.table(),
            EntityKind::PreMixture => self.premixture.table(),
            EntityKind::Composition => self.composition.table(),
            EntityKind::Weight => self.weight.table(),
            EntityKind::WeightPremixture => self.weight_premixture.table(),
            EntityKind::Work => self.work.table(),
            EntityKind::WorkPremixture => self.work_premixture.table(),
            EntityKind::Result => self.result.table(),
            EntityKind::ResultPremixture => self.result_premixture.table(),
        }
    }

    /// Row names of the entity, for the three entities that own a name
    /// column. Derived entities mirror their upstream names.
    pub fn names(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::SourceMaterial => self.material.names(),
            EntityKind::PreMixture => self.premixture.names(),
            EntityKind::Composition => self.composition.names(),
            _ => &[],
        }
    }

    pub fn nrows(&self, kind: EntityKind) -> usize {
        self.table(kind).nrows()
    }

    // ------------------------------------------------------------------
    // mutation

    /// Write one cell of an editable entity, then propagate.
    pub fn set_cell(
        &mut self,
        kind: EntityKind,
        row: usize,
        column: &str,
        value: Cell,
    ) -> Result<(), CoreError> {
        self.check_writable(kind)?;
        match kind {
            EntityKind::SourceMaterial => self.material.set_cell(row, column, value)?,
            EntityKind::PreMixture => self.premixture.set_cell(row, column, value)?,
            EntityKind::Composition => self.composition.set_cell(row, column, value)?,
            EntityKind::Work => self.work.set_cell(row, column, value)?,
            EntityKind::WorkPremixture => self.work_premixture.set_cell(row, column, value)?,
            other => return Err(CoreError::NotEditable(other)),
        }
        self.notify(kind);
        self.propagate_from(kind)
    }

    /// Resize one of the three design tables, then propagate. New rows get
    /// the entity's defaults; shrinking truncates from the end.
    pub fn set_nrows(&mut self, kind: EntityKind, nrows: usize) -> Result<(), CoreError> {
        self.check_writable(kind)?;
        match kind {
            EntityKind::SourceMaterial => self.material.resize(nrows),
            EntityKind::PreMixture => self.premixture.resize(nrows)?,
            EntityKind::Composition => self.composition.resize(nrows)?,
            other => return Err(CoreError::NotEditable(other)),
        }
        self.notify(kind);
        self.propagate_from(kind)
    }

    /// Append one default row to a design table.
    pub fn append_row(&mut self, kind: EntityKind) -> Result<(), CoreError> {
        let nrows = self.nrows(kind);
        self.set_nrows(kind, nrows + 1)
    }

    /// Remove a row from a design table, then propagate. Downstream
    /// columns keyed on the removed name drop out at reconciliation.
    pub fn remove_row(&mut self, kind: EntityKind, row: usize) -> Result<(), CoreError> {
        self.check_writable(kind)?;
        match kind {
            EntityKind::SourceMaterial => self.material.remove_row(row)?,
            EntityKind::PreMixture => self.premixture.remove_row(row)?,
            EntityKind::Composition => self.composition.remove_row(row)?,
            other => return Err(CoreError::NotEditable(other)),
        }
        self.notify(kind);
        self.propagate_from(kind)
    }

    /// Rename a row, renaming the matching downstream columns in place
    /// first so their values survive reconciliation. A raw [`set_cell`]
    /// on a name column behaves as remove-plus-add instead.
    ///
    /// [`set_cell`]: Session::set_cell
    pub fn rename_row(
        &mut self,
        kind: EntityKind,
        row: usize,
        new_name: &str,
    ) -> Result<(), CoreError> {
        self.check_writable(kind)?;
        match kind {
            EntityKind::SourceMaterial => {
                let old = self
                    .material
                    .table()
                    .text(row, MATERIAL)
                    .unwrap_or("")
                    .to_string();
                self.material.set_cell(row, MATERIAL, Cell::text(new_name))?;
                if old != new_name {
                    self.premixture.rename_material_column(&old, new_name);
                    self.composition.rename_ingredient_column(&old, new_name);
                }
            }
            EntityKind::PreMixture => {
                let old = self
                    .premixture
                    .table()
                    .text(row, PREMIXTURE)
                    .unwrap_or("")
                    .to_string();
                self.premixture
                    .set_cell(row, PREMIXTURE, Cell::text(new_name))?;
                if old != new_name {
                    self.composition.rename_ingredient_column(&old, new_name);
                }
            }
            EntityKind::Composition => {
                self.composition
                    .set_cell(row, COMPOSITION, Cell::text(new_name))?;
            }
            other => return Err(CoreError::NotEditable(other)),
        }
        self.notify(kind);
        self.propagate_from(kind)
    }

    /// Change the rounding precision of both weight tables, then rebuild
    /// the whole derived half of the pipeline. Operator logs are wiped,
    /// as with any other weight recomputation.
    pub fn set_digit(&mut self, digit: u32) -> Result<(), CoreError> {
        if self.propagating {
            return Err(CoreError::Reentrant);
        }
        self.weight.set_digit(digit);
        self.weight_premixture.set_digit(digit);
        self.propagate_from(EntityKind::SourceMaterial)
    }

    /// Change the stored presentation tolerance. No recomputation.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    // ------------------------------------------------------------------
    // subscribers

    /// Register a callback invoked with the entity's table after every
    /// change to it (direct edit or recomputation).
    pub fn subscribe(
        &mut self,
        kind: EntityKind,
        callback: impl Fn(&Table) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push(Subscriber {
            id,
            kind,
            callback: Box::new(callback),
        });
        id
    }

    /// Drop a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    fn notify(&self, kind: EntityKind) {
        let table = self.table(kind);
        for subscriber in self.subscribers.iter().filter(|s| s.kind == kind) {
            (subscriber.callback)(table);
        }
    }

    // ------------------------------------------------------------------
    // propagation

    fn check_writable(&self, kind: EntityKind) -> Result<(), CoreError> {
        if self.propagating {
            return Err(CoreError::Reentrant);
        }
        if !kind.is_editable() {
            return Err(CoreError::NotEditable(kind));
        }
        Ok(())
    }

    /// Recompute everything downstream of `source`, dependencies first.
    pub(crate) fn propagate_from(&mut self, source: EntityKind) -> Result<(), CoreError> {
        if self.propagating {
            return Err(CoreError::Reentrant);
        }
        self.propagating = true;
        let outcome = self.run_pass(source);
        self.propagating = false;
        outcome
    }

    fn run_pass(&mut self, source: EntityKind) -> Result<(), CoreError> {
        let order = self.graph.mark_changed(self.nodes[&source]);
        debug!(source = %source, affected = order.len(), "propagation pass");
        for node_id in order {
            let kind = self.kind_of(node_id);
            match self.recompute(kind) {
                Ok(()) => {
                    self.graph.mark_clean(node_id);
                    self.notify(kind);
                }
                Err(CoreError::NotReady { entity, reason }) => {
                    // upstream structure missing; wait for the next trigger
                    trace!(%entity, reason, "recompute skipped");
                    self.graph.mark_clean(node_id);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn kind_of(&self, node_id: NodeId) -> EntityKind {
        *self
            .nodes
            .iter()
            .find(|(_, id)| **id == node_id)
            .map(|(kind, _)| kind)
            .expect("node registered at construction")
    }

    fn recompute(&mut self, kind: EntityKind) -> Result<(), CoreError> {
        trace!(entity = %kind, "recompute");
        match kind {
            // source of the pipeline, never derived
            EntityKind::SourceMaterial => Ok(()),
            EntityKind::PreMixture => {
                self.premixture.reconcile(&self.material);
                Ok(())
            }
            EntityKind::Composition => {
                self.composition.reconcile(&self.material, &self.premixture);
                Ok(())
            }
            EntityKind::Weight => {
                self.weight
                    .recompute(&self.composition, &self.premixture, &self.material)
            }
            EntityKind::WeightPremixture => {
                self.weight_premixture
                    .recompute(&self.premixture, &self.material)
            }
            EntityKind::Work => {
                self.work.recompute(self.weight.table());
                Ok(())
            }
            EntityKind::WorkPremixture => {
                self.work_premixture.recompute(self.weight_premixture.table());
                Ok(())
            }
            EntityKind::ResultPremixture => {
                self.result_premixture
                    .recompute(&self.work_premixture, &self.material);
                Ok(())
            }
            EntityKind::Result => {
                self.result.recompute(
                    &self.work,
                    &self.composition,
                    &self.premixture,
                    &self.material,
                    &self.result_premixture,
                );
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // snapshot support

    /// Replace an editable entity's table wholesale. Used by snapshot
    /// restore; callers must re-propagate afterwards.
    pub(crate) fn restore_table(
        &mut self,
        kind: EntityKind,
        table: Table,
    ) -> Result<(), CoreError> {
        match kind {
            EntityKind::SourceMaterial => self.material.replace_table(table),
            EntityKind::PreMixture => self.premixture.replace_table(table),
            EntityKind::Composition => self.composition.replace_table(table),
            EntityKind::Work => self.work.replace_table(table),
            EntityKind::WorkPremixture => self.work_premixture.replace_table(table),
            other => Err(CoreError::NotEditable(other)),
        }
    }

    #[cfg(test)]
    fn force_propagating(&mut self, active: bool) {
        self.propagating = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::new(UnitMode::WeightPercent).unwrap()
    }

    #[test]
    fn construction_populates_every_table() {
        let session = session();
        assert_eq!(session.nrows(EntityKind::SourceMaterial), 3);
        assert_eq!(session.nrows(EntityKind::PreMixture), 1);
        assert_eq!(session.nrows(EntityKind::Composition), 3);
        // derived tables are already built
        assert_eq!(session.nrows(EntityKind::Weight), 3);
        assert_eq!(session.nrows(EntityKind::WorkPremixture), 1);
        assert!(session
            .table(EntityKind::Work)
            .cell(0, "Material A")
            .unwrap()
            .is_unset());
    }

    #[test]
    fn composition_edit_updates_weight_and_wipes_work() {
        let mut session = session();
        session
            .set_cell(EntityKind::Work, 0, "Material A", Cell::number(5.0))
            .unwrap();

        session
            .set_cell(
                EntityKind::Composition,
                0,
                "Material A",
                Cell::number(10.0),
            )
            .unwrap();

        assert_eq!(
            session.table(EntityKind::Weight).number(0, "Material A"),
            Some(10.0)
        );
        assert!(session
            .table(EntityKind::Work)
            .cell(0, "Material A")
            .unwrap()
            .is_unset());
    }

    #[test]
    fn work_edit_reaches_result_without_wiping_itself() {
        let mut session = session();
        session
            .set_cell(EntityKind::Work, 0, "Material A", Cell::number(40.0))
            .unwrap();
        session
            .set_cell(EntityKind::Work, 0, "Solvent", Cell::number(60.0))
            .unwrap();

        assert_eq!(
            session.table(EntityKind::Work).number(0, "Material A"),
            Some(40.0)
        );
        // 40 g at 100 wt% stock over 100 g measured total
        assert_eq!(
            session.table(EntityKind::Result).number(0, "Material A"),
            Some(40.0)
        );
    }

    #[test]
    fn derived_entities_reject_writes() {
        let mut session = session();
        assert!(matches!(
            session.set_cell(EntityKind::Weight, 0, "Material A", Cell::number(1.0)),
            Err(CoreError::NotEditable(EntityKind::Weight))
        ));
        assert!(matches!(
            session.set_nrows(EntityKind::Result, 5),
            Err(CoreError::NotEditable(EntityKind::Result))
        ));
    }

    #[test]
    fn material_resize_reshapes_downstream_columns() {
        let mut session = session();
        session.set_nrows(EntityKind::SourceMaterial, 4).unwrap();
        assert!(session
            .table(EntityKind::PreMixture)
            .has_column("Material D"));
        assert!(session.table(EntityKind::Weight).has_column("Material D"));

        session.set_nrows(EntityKind::SourceMaterial, 2).unwrap();
        assert!(!session
            .table(EntityKind::Composition)
            .has_column("Material C"));
    }

    #[test]
    fn rename_row_preserves_downstream_values() {
        let mut session = session();
        session
            .set_cell(EntityKind::PreMixture, 0, "Material B", Cell::number(25.0))
            .unwrap();

        session
            .rename_row(EntityKind::SourceMaterial, 1, "Salt")
            .unwrap();

        assert!(!session.table(EntityKind::PreMixture).has_column("Material B"));
        assert_eq!(
            session.table(EntityKind::PreMixture).number(0, "Salt"),
            Some(25.0)
        );
    }

    #[test]
    fn raw_name_edit_resets_downstream_column() {
        let mut session = session();
        session
            .set_cell(EntityKind::PreMixture, 0, "Material B", Cell::number(25.0))
            .unwrap();

        session
            .set_cell(EntityKind::SourceMaterial, 1, MATERIAL, Cell::text("Salt"))
            .unwrap();

        // remove-plus-add: the new column starts from the default
        assert_eq!(session.table(EntityKind::PreMixture).number(0, "Salt"), Some(0.0));
    }

    #[test]
    fn subscribers_fire_per_change_and_unsubscribe() {
        let mut session = session();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = session.subscribe(EntityKind::Weight, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        session
            .set_cell(
                EntityKind::Composition,
                0,
                "Material A",
                Cell::number(10.0),
            )
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // edits that do not reach the weight table do not fire
        session
            .set_cell(EntityKind::Work, 0, "Material A", Cell::number(1.0))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session
            .set_cell(
                EntityKind::Composition,
                0,
                "Material A",
                Cell::number(20.0),
            )
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writes_during_a_pass_are_rejected() {
        let mut session = session();
        session.force_propagating(true);
        assert!(matches!(
            session.set_cell(EntityKind::Composition, 0, "Material A", Cell::number(1.0)),
            Err(CoreError::Reentrant)
        ));
        assert!(matches!(session.set_digit(3), Err(CoreError::Reentrant)));
        session.force_propagating(false);
    }

    #[test]
    fn digit_change_rerounds_weights() {
        let mut session = session();
        session
            .set_cell(EntityKind::SourceMaterial, 0, "wt%", Cell::number(30.0))
            .unwrap();
        session
            .set_cell(
                EntityKind::Composition,
                0,
                "Material A",
                Cell::number(10.0),
            )
            .unwrap();
        // 10 / 30 * 100 = 33.3333...
        assert_eq!(
            session.table(EntityKind::Weight).number(0, "Material A"),
            Some(33.33)
        );

        session.set_digit(1).unwrap();
        assert_eq!(session.digit(), 1);
        assert_eq!(
            session.table(EntityKind::Weight).number(0, "Material A"),
            Some(33.3)
        );
    }

    #[test]
    fn threshold_is_stored_config_only() {
        let mut session = session();
        assert_eq!(session.threshold(), 0.01);
        session.set_threshold(0.05);
        assert_eq!(session.threshold(), 0.05);
    }
}
