//! Row-level dependency graph built from foreign key values.

use std::collections::HashMap;

use tracing::debug;

use crate::core::{KeyValue, Model, Row, Table};
use crate::error::{Result, TransferError};

use super::digraph::Digraph;

/// A dependency of one buffered row on another: `source` references `target`
/// through foreign key number `foreign_key` of the source row's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub foreign_key: usize,
    /// All local columns of the foreign key accept NULL.
    pub nullable: bool,
    /// The reference is written later by a fix-up instead of at insert time.
    pub deferred: bool,
}

/// Arena of row dependencies. Nodes are indices into the buffered row slice.
#[derive(Debug, Clone, Default)]
pub struct RowGraph {
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    external: usize,
}

/// Lookup from referenced-column values to buffered rows of one table.
type KeyIndex = HashMap<Vec<KeyValue>, Vec<usize>>;

impl RowGraph {
    /// Build the graph for `rows`.
    ///
    /// A foreign key contributes an edge only when all of its local columns
    /// are non-null. Values matching no buffered row are external references
    /// and contribute nothing; values matching several rows are rejected.
    pub fn build(rows: &[Row], model: &Model) -> Result<Self> {
        let mut graph = RowGraph {
            edges: Vec::new(),
            outgoing: vec![Vec::new(); rows.len()],
            incoming: vec![Vec::new(); rows.len()],
            external: 0,
        };

        let mut by_table: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            by_table.entry(row.table_name()).or_default().push(idx);
        }

        let mut indexes: HashMap<(String, Vec<String>), KeyIndex> = HashMap::new();

        for (source, row) in rows.iter().enumerate() {
            let table = row.table();
            for (fk_idx, fk) in table.foreign_keys.iter().enumerate() {
                let Some(key) = local_key(table, row, fk_idx)? else {
                    continue;
                };

                let target_table = model
                    .find_table(&fk.foreign_table, true)
                    .ok_or_else(|| TransferError::UnknownTable(fk.foreign_table.clone()))?;
                let foreign: Vec<String> = fk.foreign_columns().map(str::to_string).collect();
                let index_key = (target_table.name.clone(), foreign);
                if !indexes.contains_key(&index_key) {
                    let candidates = by_table
                        .get(target_table.name.as_str())
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    let index = build_index(target_table, &index_key.1, rows, candidates)?;
                    indexes.insert(index_key.clone(), index);
                }

                let matches = indexes
                    .get(&index_key)
                    .and_then(|index| index.get(&key))
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                match matches {
                    [] => {
                        debug!(
                            "{} references {} key ({}) outside the loaded rows",
                            row.describe(),
                            fk.foreign_table,
                            display_key(&key)
                        );
                        graph.external += 1;
                    }
                    [target] => {
                        let nullable = fk.local_columns().all(|name| {
                            table
                                .find_column(name, true)
                                .is_some_and(|c| c.is_nullable)
                        });
                        graph.push(Edge {
                            source,
                            target: *target,
                            foreign_key: fk_idx,
                            nullable,
                            deferred: false,
                        });
                    }
                    several => {
                        return Err(TransferError::AmbiguousReference {
                            table: table.name.clone(),
                            foreign_key: fk.display_name(),
                            key: display_key(&key),
                            matches: several.len(),
                        });
                    }
                }
            }
        }

        Ok(graph)
    }

    fn push(&mut self, edge: Edge) {
        let id = self.edges.len();
        self.outgoing[edge.source].push(id);
        self.incoming[edge.target].push(id);
        self.edges.push(edge);
    }

    /// Number of nodes (buffered rows).
    pub fn node_count(&self) -> usize {
        self.outgoing.len()
    }

    /// All edges, indexed by edge id.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edge by id.
    pub fn edge(&self, id: usize) -> &Edge {
        &self.edges[id]
    }

    /// Ids of the edges leaving `node` (its dependencies).
    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    /// Ids of the edges entering `node` (rows depending on it).
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Mark an edge as deferred.
    pub fn defer(&mut self, id: usize) {
        self.edges[id].deferred = true;
    }

    /// Number of foreign key values that pointed outside the buffered rows.
    pub fn external_references(&self) -> usize {
        self.external
    }

    /// Plain digraph of the non-deferred edges whose endpoints both satisfy
    /// `keep`.
    pub fn active_subgraph(&self, keep: impl Fn(usize) -> bool) -> Digraph {
        let mut digraph = Digraph::new(self.node_count());
        for edge in self.edges.iter().filter(|e| !e.deferred) {
            if keep(edge.source) && keep(edge.target) {
                digraph.add_edge(edge.source, edge.target);
            }
        }
        digraph
    }
}

/// Canonical values of a row's foreign key columns, `None` if any is NULL.
fn local_key(table: &Table, row: &Row, fk_idx: usize) -> Result<Option<Vec<KeyValue>>> {
    let fk = &table.foreign_keys[fk_idx];
    let mut key = Vec::with_capacity(fk.references.len());
    for name in fk.local_columns() {
        let idx = table
            .column_index(name, true)
            .ok_or_else(|| TransferError::unknown_column(&table.name, name))?;
        match row.value_at(idx).key() {
            Some(value) => key.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(key))
}

fn build_index(
    table: &Table,
    columns: &[String],
    rows: &[Row],
    candidates: &[usize],
) -> Result<KeyIndex> {
    let positions = columns
        .iter()
        .map(|name| {
            table
                .column_index(name, true)
                .ok_or_else(|| TransferError::unknown_column(&table.name, name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut index = KeyIndex::new();
    'rows: for &idx in candidates {
        let row = &rows[idx];
        let mut key = Vec::with_capacity(positions.len());
        for &pos in &positions {
            match row.value_at(pos).key() {
                Some(value) => key.push(value),
                None => continue 'rows,
            }
        }
        index.entry(key).or_default().push(idx);
    }
    Ok(index)
}

fn display_key(key: &[KeyValue]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
