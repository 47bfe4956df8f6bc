//! Snapshots
//!
//! Converts a session to and from a single `serde_json::Value` so an
//! embedder can persist it however it likes; no I/O happens here.
//!
//! The snapshot is an object keyed `<tag><ordinal>` (`SourceMaterial0`,
//! `Work0`, ...) mapping to row-oriented records. The ordinal suffix is
//! carried for compatibility with multi-instance documents and stripped on
//! load. All nine tables are saved; only the editable five are restored —
//! derived tables are re-derived by propagation, so a snapshot can never
//! smuggle in an inconsistent weight or result table.

use serde_json::{Map, Value};
use tracing::debug;

use crate::entities::EntityKind;
use crate::error::CoreError;
use crate::session::Session;
use crate::table::Table;

/// Encode every table of the session as `<tag>0` → records.
pub fn save(session: &Session) -> Value {
    let mut root = Map::new();
    for kind in EntityKind::ALL {
        let records: Vec<Value> = session
            .table(kind)
            .to_records()
            .into_iter()
            .map(Value::Object)
            .collect();
        root.insert(format!("{}0", kind.tag()), Value::Array(records));
    }
    Value::Object(root)
}

/// Restore a session from a snapshot, then re-derive everything.
///
/// Unknown tags fail with [`CoreError::UnknownEntityTag`]; entries for
/// derived entities are ignored.
pub fn load(session: &mut Session, snapshot: &Value) -> Result<(), CoreError> {
    let root: Map<String, Value> = serde_json::from_value(snapshot.clone())?;

    let mut tables: Vec<(EntityKind, Table)> = Vec::new();
    for (key, value) in &root {
        let tag = key.trim_end_matches(|c: char| c.is_ascii_digit());
        let kind = EntityKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| CoreError::UnknownEntityTag(tag.to_string()))?;
        if !kind.is_editable() {
            continue;
        }
        let records: Vec<Map<String, Value>> = serde_json::from_value(value.clone())?;
        tables.push((kind, Table::from_records(&records)?));
    }

    let mut take = |target: EntityKind| -> Option<Table> {
        let index = tables.iter().position(|(kind, _)| *kind == target)?;
        Some(tables.swap_remove(index).1)
    };

    // design tables first, then one full propagation so the derived half
    // is the shape the operator logs expect
    for kind in [
        EntityKind::SourceMaterial,
        EntityKind::PreMixture,
        EntityKind::Composition,
    ] {
        if let Some(table) = take(kind) {
            session.restore_table(kind, table)?;
        }
    }
    session.propagate_from(EntityKind::SourceMaterial)?;

    for kind in [EntityKind::Work, EntityKind::WorkPremixture] {
        if let Some(table) = take(kind) {
            session.restore_table(kind, table)?;
            session.propagate_from(kind)?;
        }
    }

    debug!("session restored from snapshot");
    Ok(())
}
