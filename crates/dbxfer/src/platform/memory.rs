//! In-memory platform.
//!
//! Holds rows per table and checks NOT NULL, primary key uniqueness and
//! foreign keys on every write, the way a database with immediate
//! constraints would. Every successful write is appended to a log so
//! callers can inspect exactly what a session issued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{ColumnType, KeyValue, Model, Platform, Row, SqlValue, Table};
use crate::error::{Result, TransferError};

/// One successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Insert { table: String, key: String },
    Update { table: String, key: String, columns: Vec<String> },
}

#[derive(Debug, Default)]
struct StoredTable {
    rows: Vec<Row>,
    next_identity: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, StoredTable>,
    log: Vec<WriteOp>,
}

/// Platform backed by process memory.
#[derive(Debug)]
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    failing_table: Option<String>,
}

impl MemoryPlatform {
    /// Create an empty database holding the tables of `model`.
    pub fn new(model: Arc<Model>) -> Self {
        let tables = model
            .tables()
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    StoredTable {
                        rows: Vec::new(),
                        next_identity: 1,
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                tables,
                log: Vec::new(),
            }),
            failing_table: None,
        }
    }

    /// Reject every insert into `table`.
    pub fn with_failing_table(mut self, table: impl Into<String>) -> Self {
        self.failing_table = Some(table.into());
        self
    }

    /// Store rows that exist before a session starts.
    ///
    /// Constraints are checked as for inserts, but nothing is logged and
    /// identity values are taken as given.
    pub fn preload(&self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let mut state = self.lock()?;
        for row in rows {
            let table = Arc::clone(row.table());
            check_row(&state, &table, &row, None)?;
            let stored = stored_mut(&mut state, &table.name)?;
            if let Some(idx) = table.identity_index() {
                if let Some(KeyValue::Int(v)) = row.value_at(idx).key() {
                    stored.next_identity = stored.next_identity.max(v + 1);
                }
            }
            stored.rows.push(row);
        }
        Ok(())
    }

    /// Snapshot of the rows of a table in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let state = self.lock()?;
        Ok(stored(&state, table)?.rows.clone())
    }

    /// Number of rows stored in a table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let state = self.lock()?;
        Ok(stored(&state, table)?.rows.len())
    }

    /// Every write issued since creation.
    pub fn write_log(&self) -> Result<Vec<WriteOp>> {
        Ok(self.lock()?.log.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| TransferError::Database("memory platform state is poisoned".into()))
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn insert(&self, table: &Table, row: &Row) -> Result<Option<SqlValue<'static>>> {
        if self.failing_table.as_deref() == Some(table.name.as_str()) {
            return Err(TransferError::Database(format!(
                "insert into {} rejected",
                table.name
            )));
        }

        let mut state = self.lock()?;
        let mut row = row.clone();
        let mut generated = None;

        let stored = stored_mut(&mut state, &table.name)?;
        if let Some(idx) = table.identity_index() {
            let supplied = row.value_at(idx).key();
            match supplied {
                None => {
                    let value = identity_value(table.columns[idx].column_type, stored.next_identity)?;
                    stored.next_identity += 1;
                    row.set_at(idx, value.clone());
                    generated = Some(value);
                }
                Some(KeyValue::Int(v)) => {
                    stored.next_identity = stored.next_identity.max(v + 1);
                }
                Some(_) => {}
            }
        }

        check_row(&state, table, &row, None)?;

        let key = row.key_description();
        debug!("memory: insert into {} ({})", table.name, key);
        stored_mut(&mut state, &table.name)?.rows.push(row);
        state.log.push(WriteOp::Insert {
            table: table.name.clone(),
            key,
        });
        Ok(generated)
    }

    async fn update(
        &self,
        table: &Table,
        key: &[(String, SqlValue<'static>)],
        values: &[(String, SqlValue<'static>)],
    ) -> Result<()> {
        let mut state = self.lock()?;
        let position = stored(&state, &table.name)?
            .rows
            .iter()
            .position(|row| row_matches(row, key))
            .ok_or_else(|| {
                TransferError::Database(format!(
                    "no row in {} with key {}",
                    table.name,
                    describe_pairs(key)
                ))
            })?;

        let mut updated = stored(&state, &table.name)?.rows[position].clone();
        for (column, value) in values {
            updated.set(column, value.clone())?;
        }
        check_row(&state, table, &updated, Some(position))?;

        let key_text = updated.key_description();
        debug!("memory: update {} ({})", table.name, key_text);
        stored_mut(&mut state, &table.name)?.rows[position] = updated;
        state.log.push(WriteOp::Update {
            table: table.name.clone(),
            key: key_text,
            columns: values.iter().map(|(c, _)| c.clone()).collect(),
        });
        Ok(())
    }

    fn fetch_rows(&self, table: &Table) -> mpsc::Receiver<Result<Row>> {
        let rows = match self.lock().and_then(|state| Ok(stored(&state, &table.name)?.rows.clone())) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        let (tx, rx) = mpsc::channel(rows.len().max(1));
        for row in rows {
            // capacity covers every row, so this never blocks or fails
            if tx.try_send(row).is_err() {
                break;
            }
        }
        rx
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn stored<'s>(state: &'s MemoryState, table: &str) -> Result<&'s StoredTable> {
    state
        .tables
        .get(table)
        .ok_or_else(|| TransferError::Database(format!("no such table {table}")))
}

fn stored_mut<'s>(state: &'s mut MemoryState, table: &str) -> Result<&'s mut StoredTable> {
    state
        .tables
        .get_mut(table)
        .ok_or_else(|| TransferError::Database(format!("no such table {table}")))
}

fn identity_value(column_type: ColumnType, next: i64) -> Result<SqlValue<'static>> {
    let overflow = || TransferError::Database(format!("identity overflow at {next}"));
    Ok(match column_type {
        ColumnType::TinyInt | ColumnType::SmallInt => {
            SqlValue::I16(i16::try_from(next).map_err(|_| overflow())?)
        }
        ColumnType::Integer => SqlValue::I32(i32::try_from(next).map_err(|_| overflow())?),
        ColumnType::BigInt => SqlValue::I64(next),
        ColumnType::Decimal => SqlValue::Decimal(BigDecimal::from(next)),
        other => {
            return Err(TransferError::Database(format!(
                "cannot generate identity values for {other:?} columns"
            )))
        }
    })
}

fn row_matches(row: &Row, key: &[(String, SqlValue<'static>)]) -> bool {
    key.iter().all(|(column, value)| {
        row.get(column)
            .map(|current| current.key().is_some() && current.key() == value.key())
            .unwrap_or(false)
    })
}

fn describe_pairs(pairs: &[(String, SqlValue<'static>)]) -> String {
    pairs
        .iter()
        .map(|(c, v)| format!("{c}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Check constraints for `row`; `replacing` is the position of the row
/// being updated, which does not count as a duplicate of itself.
fn check_row(state: &MemoryState, table: &Table, row: &Row, replacing: Option<usize>) -> Result<()> {
    for (idx, column) in table.columns.iter().enumerate() {
        if !column.is_nullable && row.value_at(idx).is_null() {
            return Err(TransferError::Database(format!(
                "NOT NULL constraint failed: {}.{}",
                table.name, column.name
            )));
        }
    }

    let pk = table.primary_key_indices();
    if !pk.is_empty() {
        let key: Vec<Option<KeyValue>> = pk.iter().map(|i| row.value_at(*i).key()).collect();
        let existing = &stored(state, &table.name)?.rows;
        let duplicate = existing.iter().enumerate().any(|(pos, other)| {
            Some(pos) != replacing
                && pk
                    .iter()
                    .zip(&key)
                    .all(|(i, k)| k.is_some() && &other.value_at(*i).key() == k)
        });
        if duplicate {
            return Err(TransferError::Database(format!(
                "duplicate primary key in {} ({})",
                table.name,
                row.key_description()
            )));
        }
    }

    for fk in &table.foreign_keys {
        let mut key = Vec::with_capacity(fk.references.len());
        for reference in &fk.references {
            let Some(idx) = table.column_index(&reference.local, true) else {
                return Err(TransferError::unknown_column(&table.name, &reference.local));
            };
            match row.value_at(idx).key() {
                Some(value) => key.push((reference.foreign.as_str(), value)),
                None => break,
            }
        }
        if key.len() < fk.references.len() {
            continue;
        }

        // a self-reference may point at the row being written
        let self_match = fk.foreign_table == table.name
            && key
                .iter()
                .all(|(column, value)| row.get(column).ok().and_then(|v| v.key()).as_ref() == Some(value));
        let found = self_match
            || stored(state, &fk.foreign_table)?.rows.iter().any(|target| {
                key.iter().all(|(column, value)| {
                    target.get(column).ok().and_then(|v| v.key()).as_ref() == Some(value)
                })
            });
        if !found {
            return Err(TransferError::Database(format!(
                "foreign key violation: {} of {} references missing {} row",
                fk.display_name(),
                row.describe(),
                fk.foreign_table
            )));
        }
    }
    Ok(())
}
