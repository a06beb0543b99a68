//! Mapping from supplied identity values to platform-generated ones.

use std::collections::HashMap;

use crate::core::{ForeignKey, KeyValue, Row, SqlValue, Table};

#[derive(Debug, Default)]
struct TableRemap {
    /// Name of the identity column the keys belong to.
    column: String,
    keys: HashMap<KeyValue, SqlValue<'static>>,
}

/// Per-session record of generated identity values.
///
/// Keyed by table, then by the canonical form of the value supplied in the
/// transfer stream. Foreign key values pointing at a remapped identity
/// column are rewritten before the referencing row is written.
#[derive(Debug, Default)]
pub struct IdentityRemap {
    tables: HashMap<String, TableRemap>,
    entries: usize,
}

impl IdentityRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `original` in the identity column of `table` was stored as
    /// `generated`. NULL originals are ignored.
    pub fn record(&mut self, table: &Table, original: &SqlValue<'_>, generated: SqlValue<'static>) {
        let (Some(idx), Some(key)) = (table.identity_index(), original.key()) else {
            return;
        };
        let entry = self
            .tables
            .entry(table.name.clone())
            .or_insert_with(|| TableRemap {
                column: table.columns[idx].name.clone(),
                keys: HashMap::new(),
            });
        if entry.keys.insert(key, generated).is_none() {
            self.entries += 1;
        }
    }

    /// Value to write for reference `reference` of `fk` given the supplied
    /// `value`: the generated key when the referenced column was remapped,
    /// the value itself otherwise.
    pub fn translate(&self, fk: &ForeignKey, reference: usize, value: &SqlValue<'static>) -> SqlValue<'static> {
        let Some(remap) = self.tables.get(&fk.foreign_table) else {
            return value.clone();
        };
        let Some(reference) = fk.references.get(reference) else {
            return value.clone();
        };
        if reference.foreign != remap.column {
            return value.clone();
        }
        value
            .key()
            .and_then(|key| remap.keys.get(&key))
            .cloned()
            .unwrap_or_else(|| value.clone())
    }

    /// Rewrite every foreign key value of `row` that points at a remapped
    /// identity. Returns the number of values changed.
    pub fn remap_row(&self, row: &mut Row) -> usize {
        if self.tables.is_empty() {
            return 0;
        }
        let table = std::sync::Arc::clone(row.table());
        let mut changed = 0;
        for fk in &table.foreign_keys {
            for (ri, reference) in fk.references.iter().enumerate() {
                let Some(idx) = table.column_index(&reference.local, true) else {
                    continue;
                };
                let current = row.value_at(idx);
                if current.is_null() {
                    continue;
                }
                let translated = self.translate(fk, ri, current);
                if &translated != current {
                    row.set_at(idx, translated);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Number of remapped identity values.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
