//! Bulk loader: writes buffered rows in dependency order.
//!
//! The whole row set is resolved before the first write, so ordering
//! failures (cycles without a nullable reference, ambiguous references,
//! missing primary keys) leave the target untouched.

pub mod remap;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::core::{Model, Platform, Row, SqlValue, Table};
use crate::error::{Result, TransferError};
use crate::graph::{DependencyResolver, FixUp, LoadPlan};

pub use remap::IdentityRemap;

/// Outcome of one load session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadStats {
    /// Session identifier used in log lines.
    pub session_id: String,

    /// Rows handed to the loader.
    pub rows_total: usize,

    /// Rows written.
    pub rows_inserted: usize,

    /// References that could not be written at insert time.
    pub fixups_deferred: usize,

    /// Deferred references written by an update.
    pub fixups_issued: usize,

    /// Deferred references whose target was already present when the
    /// referencing row was inserted.
    pub fixups_applied_inline: usize,

    /// Supplied identity values replaced by generated ones.
    pub identities_remapped: usize,

    /// Foreign key values that matched no loaded row.
    pub external_references: usize,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl LoadStats {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Loads rows through a [`Platform`].
pub struct BulkLoader {
    platform: Arc<dyn Platform>,
    model: Arc<Model>,
    identity_override: bool,
    cancel: Option<watch::Receiver<bool>>,
}

impl BulkLoader {
    /// Create a loader writing to `platform`.
    pub fn new(platform: Arc<dyn Platform>, model: Arc<Model>, config: &SessionConfig) -> Self {
        Self {
            platform,
            model,
            identity_override: config.identity_override,
            cancel: None,
        }
    }

    /// Stop between rows once `cancel` turns true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolve the insertion order without writing anything.
    pub fn plan(&self, rows: &[Row]) -> Result<LoadPlan> {
        DependencyResolver::new(&self.model).resolve_rows(rows)
    }

    /// Write `rows` in dependency order, then patch deferred references.
    pub async fn load(&self, rows: Vec<Row>) -> Result<LoadStats> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(
            "Starting load session {}: {} rows into {}",
            session_id,
            rows.len(),
            self.platform.name()
        );

        let plan = self.plan(&rows)?;
        let n = rows.len();

        let mut stats = LoadStats {
            session_id: session_id.clone(),
            rows_total: n,
            fixups_deferred: plan.fixups.len(),
            external_references: plan.external_references,
            ..Default::default()
        };

        let mut by_source: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut by_target: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (id, fixup) in plan.fixups.iter().enumerate() {
            by_source[fixup.row].push(id);
            by_target[fixup.target].push(id);
        }

        let tables: Vec<Arc<Table>> = rows.iter().map(|r| Arc::clone(r.table())).collect();
        let mut slots: Vec<Option<Row>> = rows.into_iter().map(Some).collect();
        let mut emitted = vec![false; n];
        let mut inserted_keys: Vec<Vec<(String, SqlValue<'static>)>> = vec![Vec::new(); n];
        let mut outstanding = vec![true; plan.fixups.len()];
        let mut remap = IdentityRemap::new();

        for &idx in &plan.order {
            self.check_cancelled(&session_id)?;

            let mut row = slots[idx].take().ok_or_else(|| {
                TransferError::Consistency(format!("row {idx} appears twice in the load order"))
            })?;

            for &id in &by_source[idx] {
                let fixup = &plan.fixups[id];
                if emitted[fixup.target] {
                    debug!(
                        "{}: reference target already present, writing {} inline",
                        session_id,
                        fixup.columns.join(",")
                    );
                    outstanding[id] = false;
                    stats.fixups_applied_inline += 1;
                } else {
                    for column in &fixup.columns {
                        row.clear(column)?;
                    }
                }
            }

            remap.remap_row(&mut row);

            let table = Arc::clone(row.table());
            let identity = table.identity_index().filter(|_| !self.identity_override);
            let supplied_identity = identity.map(|i| row.value_at(i).clone());
            if let Some(i) = identity {
                row.set_at(i, row.value_at(i).to_null());
            }

            let generated = self
                .platform
                .insert(&table, &row)
                .await
                .map_err(|e| platform_error(&row, e))?;
            stats.rows_inserted += 1;

            if let Some(i) = identity {
                match generated {
                    Some(value) => {
                        if let Some(original) = supplied_identity.as_ref().filter(|v| !v.is_null()) {
                            remap.record(&table, original, value.clone());
                            stats.identities_remapped += 1;
                        }
                        row.set_at(i, value);
                    }
                    None => warn!(
                        "{}: {} returned no generated key for {}",
                        session_id,
                        self.platform.name(),
                        row.describe()
                    ),
                }
            }

            inserted_keys[idx] = row.primary_key();
            emitted[idx] = true;

            for &id in &by_target[idx] {
                let fixup = &plan.fixups[id];
                if !outstanding[id] || !emitted[fixup.row] {
                    continue;
                }
                self.issue_fixup(fixup, &tables[fixup.row], &inserted_keys, &remap)
                    .await?;
                outstanding[id] = false;
                stats.fixups_issued += 1;
            }
        }

        if let Some(id) = outstanding.iter().position(|o| *o) {
            let fixup = &plan.fixups[id];
            return Err(TransferError::Consistency(format!(
                "deferred reference of row {} to row {} was never written",
                fixup.row, fixup.target
            )));
        }

        stats.duration_seconds = start.elapsed().as_secs_f64();
        info!(
            "Load session {} complete: {} rows, {} deferred references ({} updated, {} inline), {} identities remapped in {:.1}s",
            session_id,
            stats.rows_inserted,
            stats.fixups_deferred,
            stats.fixups_issued,
            stats.fixups_applied_inline,
            stats.identities_remapped,
            stats.duration_seconds
        );
        Ok(stats)
    }

    async fn issue_fixup(
        &self,
        fixup: &FixUp,
        source_table: &Table,
        inserted_keys: &[Vec<(String, SqlValue<'static>)>],
        remap: &IdentityRemap,
    ) -> Result<()> {
        let fk = &source_table.foreign_keys[fixup.foreign_key];
        let values: Vec<(String, SqlValue<'static>)> = fixup
            .columns
            .iter()
            .zip(&fixup.values)
            .enumerate()
            .map(|(ri, (column, value))| (column.clone(), remap.translate(fk, ri, value)))
            .collect();
        let key = &inserted_keys[fixup.row];

        debug!(
            "Updating {} ({}) to set {}",
            source_table.name,
            describe_pairs(key),
            describe_pairs(&values)
        );
        self.platform
            .update(source_table, key, &values)
            .await
            .map_err(|e| TransferError::platform(&source_table.name, describe_pairs(key), message_of(e)))
    }

    fn check_cancelled(&self, session_id: &str) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                info!("Load session {} cancelled", session_id);
                return Err(TransferError::Cancelled);
            }
        }
        Ok(())
    }
}

fn platform_error(row: &Row, err: TransferError) -> TransferError {
    TransferError::platform(row.table_name(), row.key_description(), message_of(err))
}

fn message_of(err: TransferError) -> String {
    match err {
        TransferError::Database(message) => message,
        TransferError::Platform { message, .. } => message,
        other => other.to_string(),
    }
}

fn describe_pairs(pairs: &[(String, SqlValue<'static>)]) -> String {
    pairs
        .iter()
        .map(|(c, v)| format!("{c}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, ColumnType, ForeignKey};
    use crate::platform::{MemoryPlatform, WriteOp};

    fn int(name: &str) -> Column {
        Column::new(name, ColumnType::Integer)
    }

    fn row(model: &Model, table: &str, pairs: &[(&'static str, i32)]) -> Row {
        let table = Arc::clone(model.find_table(table, true).unwrap());
        Row::from_pairs(table, pairs.iter().map(|(c, v)| (*c, *v))).unwrap()
    }

    fn misc_model() -> Arc<Model> {
        Arc::new(Model::new(
            "misc",
            vec![Table::new("misc", vec![int("id").primary_key(), int("parent")])
                .with_foreign_key(ForeignKey::new("misc", &[("parent", "id")]))],
        ))
    }

    fn loader(platform: &Arc<MemoryPlatform>, model: &Arc<Model>) -> BulkLoader {
        BulkLoader::new(platform.clone(), Arc::clone(model), &SessionConfig::default())
    }

    fn insert(table: &str, key: &str) -> WriteOp {
        WriteOp::Insert {
            table: table.into(),
            key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_forward_references_are_reordered() {
        let model = misc_model();
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let rows = vec![
            row(&model, "misc", &[("id", 2), ("parent", 4)]),
            row(&model, "misc", &[("id", 4), ("parent", 1)]),
            row(&model, "misc", &[("id", 1)]),
        ];

        let stats = loader(&platform, &model).load(rows).await.unwrap();
        assert_eq!(stats.rows_inserted, 3);
        assert_eq!(stats.fixups_deferred, 0);
        assert_eq!(
            platform.write_log().unwrap(),
            vec![
                insert("misc", "id=1"),
                insert("misc", "id=4"),
                insert("misc", "id=2")
            ]
        );
    }

    #[tokio::test]
    async fn test_misc_rows_load_parent_first() {
        let model = misc_model();
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let rows = vec![
            row(&model, "misc", &[("id", 4), ("parent", 1)]),
            row(&model, "misc", &[("id", 1)]),
            row(&model, "misc", &[("id", 2), ("parent", 1)]),
        ];

        let stats = loader(&platform, &model).load(rows).await.unwrap();
        assert_eq!(stats.fixups_deferred, 0);
        assert_eq!(stats.fixups_issued, 0);
        assert_eq!(
            platform.write_log().unwrap(),
            vec![
                insert("misc", "id=1"),
                insert("misc", "id=4"),
                insert("misc", "id=2")
            ]
        );
    }

    #[tokio::test]
    async fn test_self_reference_gets_one_update() {
        let model = misc_model();
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let rows = vec![row(&model, "misc", &[("id", 1), ("parent", 1)])];

        let stats = loader(&platform, &model).load(rows).await.unwrap();
        assert_eq!(stats.fixups_deferred, 1);
        assert_eq!(stats.fixups_issued, 1);
        assert_eq!(
            platform.write_log().unwrap(),
            vec![
                insert("misc", "id=1"),
                WriteOp::Update {
                    table: "misc".into(),
                    key: "id=1".into(),
                    columns: vec!["parent".into()],
                }
            ]
        );
        let stored = platform.rows("misc").unwrap();
        assert_eq!(stored[0].get("parent").unwrap(), &SqlValue::I32(1));
    }

    #[tokio::test]
    async fn test_hard_cycle_writes_nothing() {
        let model = Arc::new(Model::new(
            "hard",
            vec![
                Table::new("a", vec![int("id").primary_key(), int("b_id").not_null()])
                    .with_foreign_key(ForeignKey::new("b", &[("b_id", "id")])),
                Table::new("b", vec![int("id").primary_key(), int("a_id").not_null()])
                    .with_foreign_key(ForeignKey::new("a", &[("a_id", "id")])),
            ],
        ));
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let rows = vec![
            row(&model, "a", &[("id", 1), ("b_id", 1)]),
            row(&model, "b", &[("id", 1), ("a_id", 1)]),
        ];

        let err = loader(&platform, &model).load(rows).await.unwrap_err();
        assert!(matches!(err, TransferError::CyclicConstraint { .. }));
        assert!(platform.write_log().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generated_identities_are_propagated() {
        let model = Arc::new(Model::new(
            "pair",
            vec![
                Table::new("a", vec![int("id").primary_key().identity(), int("b_id").not_null()])
                    .with_foreign_key(ForeignKey::new("b", &[("b_id", "id")])),
                Table::new("b", vec![int("id").primary_key().identity(), int("a_id")])
                    .with_foreign_key(ForeignKey::new("a", &[("a_id", "id")])),
            ],
        ));
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let rows = vec![
            row(&model, "a", &[("id", 10), ("b_id", 20)]),
            row(&model, "b", &[("id", 20), ("a_id", 10)]),
        ];

        let stats = loader(&platform, &model).load(rows).await.unwrap();
        assert_eq!(stats.identities_remapped, 2);
        assert_eq!(stats.fixups_issued, 1);

        let a = platform.rows("a").unwrap();
        let b = platform.rows("b").unwrap();
        assert_eq!(a[0].get("id").unwrap(), &SqlValue::I32(1));
        assert_eq!(a[0].get("b_id").unwrap(), &SqlValue::I32(1));
        assert_eq!(b[0].get("id").unwrap(), &SqlValue::I32(1));
        assert_eq!(b[0].get("a_id").unwrap(), &SqlValue::I32(1));
    }

    #[tokio::test]
    async fn test_identity_override_keeps_supplied_keys() {
        let model = Arc::new(Model::new(
            "ident",
            vec![Table::new("t", vec![int("id").primary_key().identity()])],
        ));
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let config = SessionConfig::default().with_identity_override(true);
        let loader = BulkLoader::new(platform.clone(), Arc::clone(&model), &config);

        let stats = loader
            .load(vec![row(&model, "t", &[("id", 42)])])
            .await
            .unwrap();
        assert_eq!(stats.identities_remapped, 0);
        assert_eq!(
            platform.rows("t").unwrap()[0].get("id").unwrap(),
            &SqlValue::I32(42)
        );
    }

    #[tokio::test]
    async fn test_external_reference_is_left_alone() {
        let model = misc_model();
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        platform
            .preload(vec![row(&model, "misc", &[("id", 99)])])
            .unwrap();

        let stats = loader(&platform, &model)
            .load(vec![row(&model, "misc", &[("id", 1), ("parent", 99)])])
            .await
            .unwrap();
        assert_eq!(stats.external_references, 1);
        assert_eq!(platform.row_count("misc").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_platform_failure_names_the_row() {
        let model = misc_model();
        let platform =
            Arc::new(MemoryPlatform::new(Arc::clone(&model)).with_failing_table("misc"));

        let err = loader(&platform, &model)
            .load(vec![row(&model, "misc", &[("id", 7)])])
            .await
            .unwrap_err();
        match err {
            TransferError::Platform { table, key, .. } => {
                assert_eq!(table, "misc");
                assert_eq!(key, "id=7");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_row() {
        let model = misc_model();
        let platform = Arc::new(MemoryPlatform::new(Arc::clone(&model)));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = loader(&platform, &model)
            .with_cancel(rx)
            .load(vec![row(&model, "misc", &[("id", 1)])])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(platform.write_log().unwrap().is_empty());
    }
}
