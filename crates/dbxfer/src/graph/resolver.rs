//! Insertion ordering for buffered rows and for whole tables.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::{Model, Row, SqlValue, Table};
use crate::error::{Result, TransferError};

use super::digraph::Digraph;
use super::rows::{Edge, RowGraph};

/// Rows listed in a cyclic constraint error before the list is cut short.
const MAX_REPORTED_ROWS: usize = 20;

/// Resolution state of a buffered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unresolved,
    Ready,
    Emitted,
}

/// A foreign key reference inserted as NULL and written afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FixUp {
    /// Row holding the reference.
    pub row: usize,
    /// Foreign key number within the row's table.
    pub foreign_key: usize,
    /// Local column names of the foreign key.
    pub columns: Vec<String>,
    /// Values those columns carried in the input.
    pub values: Vec<SqlValue<'static>>,
    /// Referenced row.
    pub target: usize,
}

/// Insertion order for a set of rows plus the references to write later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadPlan {
    /// Row indices in insertion order; a permutation of the input.
    pub order: Vec<usize>,
    /// Deferred references in the order they were chosen.
    pub fixups: Vec<FixUp>,
    /// Foreign key values that matched no buffered row.
    pub external_references: usize,
}

/// Tables that are exported together.
#[derive(Debug, Clone, Serialize)]
pub struct TableGroup {
    /// Member tables in model order.
    #[serde(serialize_with = "serialize_table_names")]
    pub tables: Vec<Arc<Table>>,
    /// Members reference each other, or the single member references itself.
    pub cyclic: bool,
}

fn serialize_table_names<S: serde::Serializer>(
    tables: &[Arc<Table>],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(tables.iter().map(|t| t.name.as_str()))
}

/// Computes dependency orders against a model.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'m> {
    model: &'m Model,
}

impl<'m> DependencyResolver<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self { model }
    }

    /// Order `rows` so that every non-deferred reference points at an
    /// earlier row.
    ///
    /// Rows become ready in rounds; each round emits its ready rows in input
    /// order. When no row is ready, every reference cycle among the
    /// remaining rows gets one nullable reference deferred. A cycle without
    /// any nullable reference cannot be loaded and fails the whole plan.
    pub fn resolve_rows(&self, rows: &[Row]) -> Result<LoadPlan> {
        let mut graph = RowGraph::build(rows, self.model)?;
        let n = rows.len();

        let mut state = vec![NodeState::Unresolved; n];
        let mut pending: Vec<usize> = (0..n).map(|v| graph.outgoing(v).len()).collect();
        let mut order = Vec::with_capacity(n);
        let mut fixups = Vec::new();

        let mut ready: Vec<usize> = (0..n).filter(|v| pending[*v] == 0).collect();
        for &v in &ready {
            state[v] = NodeState::Ready;
        }

        loop {
            while !ready.is_empty() {
                let mut next = Vec::new();
                for v in ready {
                    state[v] = NodeState::Emitted;
                    order.push(v);
                    for &id in graph.incoming(v) {
                        let edge = graph.edge(id);
                        if edge.deferred {
                            continue;
                        }
                        pending[edge.source] -= 1;
                        if pending[edge.source] == 0 && state[edge.source] == NodeState::Unresolved {
                            state[edge.source] = NodeState::Ready;
                            next.push(edge.source);
                        }
                    }
                }
                next.sort_unstable();
                ready = next;
            }

            if order.len() == n {
                break;
            }

            for id in self.break_cycles(rows, &graph, &state)? {
                graph.defer(id);
                let edge = graph.edge(id).clone();
                fixups.push(fixup_for(rows, &edge)?);

                pending[edge.source] -= 1;
                if pending[edge.source] == 0 {
                    state[edge.source] = NodeState::Ready;
                    ready.push(edge.source);
                }
            }
            ready.sort_unstable();
        }

        for fixup in &fixups {
            let table = rows[fixup.row].table();
            if !table.has_pk() {
                return Err(TransferError::NoPrimaryKey(table.name.clone()));
            }
        }

        info!(
            "Resolved insertion order for {} rows ({} deferred references, {} external)",
            n,
            fixups.len(),
            graph.external_references()
        );

        Ok(LoadPlan {
            order,
            fixups,
            external_references: graph.external_references(),
        })
    }

    /// Pick the nullable edges to defer when no row is ready.
    ///
    /// Every cyclic component of the unresolved rows gets one edge deferred:
    /// the nullable internal edge with the lowest source row, then the lowest
    /// foreign key position. Edges come back in component order. If any
    /// component has no nullable internal edge the plan fails.
    fn break_cycles(
        &self,
        rows: &[Row],
        graph: &RowGraph,
        state: &[NodeState],
    ) -> Result<Vec<usize>> {
        let unresolved = |v: usize| state[v] != NodeState::Emitted;
        let digraph = graph.active_subgraph(unresolved);

        let mut member_of = vec![usize::MAX; rows.len()];
        let cycles: Vec<Vec<usize>> = digraph
            .strongly_connected_components()
            .into_iter()
            .filter(|c| unresolved(c[0]) && digraph.is_cyclic(c))
            .collect();
        for (ci, component) in cycles.iter().enumerate() {
            for &v in component {
                member_of[v] = ci;
            }
        }

        let mut choice: Vec<Option<usize>> = vec![None; cycles.len()];
        for (id, edge) in graph.edges().iter().enumerate() {
            if edge.deferred || !edge.nullable {
                continue;
            }
            let ci = member_of[edge.source];
            if ci == usize::MAX || member_of[edge.target] != ci {
                continue;
            }
            let better = match choice[ci] {
                None => true,
                Some(current) => {
                    let cur = graph.edge(current);
                    (edge.source, edge.foreign_key) < (cur.source, cur.foreign_key)
                }
            };
            if better {
                choice[ci] = Some(id);
            }
        }

        let mut deferred = Vec::with_capacity(cycles.len());
        for (ci, component) in cycles.iter().enumerate() {
            match choice[ci] {
                Some(id) => deferred.push(id),
                None => return Err(cyclic_error(rows, component)),
            }
        }
        if deferred.is_empty() {
            return Err(TransferError::Consistency(
                "dependency resolution stalled without a reference cycle".into(),
            ));
        }
        Ok(deferred)
    }

    /// Export order for the model's tables.
    ///
    /// Groups come out in dependency order; tables that reference each other
    /// (or themselves) share one group. Ties are broken by model order.
    pub fn resolve_tables(&self) -> Vec<TableGroup> {
        let tables = self.model.tables();
        let n = tables.len();
        let mut digraph = Digraph::new(n);
        for (from, table) in tables.iter().enumerate() {
            for fk in &table.foreign_keys {
                if let Some(to) = self.model.table_index(&fk.foreign_table, true) {
                    digraph.add_edge(from, to);
                }
            }
        }

        let components = digraph.strongly_connected_components();
        let mut component_of = vec![0usize; n];
        for (ci, component) in components.iter().enumerate() {
            for &t in component {
                component_of[t] = ci;
            }
        }

        // dependencies[c]: components c references; dependents[c]: the reverse
        let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        for from in 0..n {
            for &to in digraph.successors(from) {
                let (cf, ct) = (component_of[from], component_of[to]);
                if cf != ct {
                    dependencies[cf].insert(ct);
                    dependents[ct].insert(cf);
                }
            }
        }

        let mut pending: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: Vec<usize> = (0..components.len()).filter(|c| pending[*c] == 0).collect();
        let mut groups = Vec::with_capacity(components.len());

        while !ready.is_empty() {
            let mut next = Vec::new();
            for c in ready {
                let members = &components[c];
                groups.push(TableGroup {
                    tables: members.iter().map(|t| Arc::clone(&tables[*t])).collect(),
                    cyclic: digraph.is_cyclic(members),
                });
                for &d in &dependents[c] {
                    pending[d] -= 1;
                    if pending[d] == 0 {
                        next.push(d);
                    }
                }
            }
            next.sort_unstable();
            ready = next;
        }

        info!(
            "Resolved export order for {} tables in {} groups",
            n,
            groups.len()
        );
        groups
    }

    /// Flat export order of the model's tables.
    pub fn table_order(&self) -> Vec<Arc<Table>> {
        self.resolve_tables()
            .into_iter()
            .flat_map(|group| group.tables)
            .collect()
    }
}

fn fixup_for(rows: &[Row], edge: &Edge) -> Result<FixUp> {
    let source = &rows[edge.source];
    let fk = &source.table().foreign_keys[edge.foreign_key];
    let columns: Vec<String> = fk.local_columns().map(str::to_string).collect();
    let values = columns
        .iter()
        .map(|name| source.get(name).cloned())
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Deferring {} of {} (references {})",
        fk.display_name(),
        source.describe(),
        rows[edge.target].describe()
    );
    Ok(FixUp {
        row: edge.source,
        foreign_key: edge.foreign_key,
        columns,
        values,
        target: edge.target,
    })
}

fn cyclic_error(rows: &[Row], component: &[usize]) -> TransferError {
    let mut tables: Vec<String> = Vec::new();
    for &v in component {
        let name = rows[v].table_name();
        if !tables.iter().any(|t| t == name) {
            tables.push(name.to_string());
        }
    }
    let mut described: Vec<String> = component
        .iter()
        .take(MAX_REPORTED_ROWS)
        .map(|v| rows[*v].describe())
        .collect();
    if component.len() > MAX_REPORTED_ROWS {
        described.push(format!(
            "... and {} more",
            component.len() - MAX_REPORTED_ROWS
        ));
    }
    TransferError::CyclicConstraint {
        tables,
        rows: described,
    }
}
