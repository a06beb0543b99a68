//! Backup and restore sessions.
//!
//! A restore reads a transfer stream completely, orders the rows and loads
//! them through a platform. A backup walks the model's tables in dependency
//! order and writes every row the platform returns.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::codec::{DataReader, DataWriter, ReadStats, ValueCodec};
use crate::config::SessionConfig;
use crate::core::{Model, Platform, Row};
use crate::error::Result;
use crate::graph::{DependencyResolver, LoadPlan};
use crate::loader::{BulkLoader, LoadStats};

/// Result of a restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the restore started.
    pub started_at: DateTime<Utc>,

    /// When the restore completed.
    pub completed_at: DateTime<Utc>,

    /// Decoding counters.
    pub read: ReadStats,

    /// Loader counters.
    pub load: LoadStats,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// Rows exported from one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableExport {
    pub table: String,
    pub rows: u64,
}

/// Result of a backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the backup started.
    pub started_at: DateTime<Utc>,

    /// When the backup completed.
    pub completed_at: DateTime<Utc>,

    /// Per-table row counts in export order.
    pub tables: Vec<TableExport>,

    /// Total rows written.
    pub rows_written: u64,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl RestoreResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl BackupResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A decoded transfer stream and its insertion plan.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub rows: Vec<Row>,
    pub plan: LoadPlan,
    pub read: ReadStats,
}

/// Runs backup and restore sessions over one model.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    model: Arc<Model>,
    config: SessionConfig,
    codec: ValueCodec,
}

impl TransferEngine {
    /// Create an engine; the configuration is validated up front.
    pub fn new(model: Arc<Model>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            codec: ValueCodec::default(),
        })
    }

    /// Use a custom value codec (e.g. for object columns).
    pub fn with_codec(mut self, codec: ValueCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Reader bound to this engine's model and settings.
    pub fn reader(&self) -> DataReader {
        DataReader::new(Arc::clone(&self.model), &self.config, self.codec.clone())
    }

    /// Writer bound to this engine's settings.
    pub fn writer<W: Write>(&self, output: W) -> Result<DataWriter<W>> {
        DataWriter::new(output, &self.config, self.codec.clone())
    }

    /// Decode a transfer stream and compute its insertion plan without
    /// writing anything.
    pub fn plan<R: BufRead>(&self, input: R) -> Result<RestorePlan> {
        let (rows, read) = self.reader().read_rows_with_stats(input)?;
        let plan = DependencyResolver::new(&self.model).resolve_rows(&rows)?;
        Ok(RestorePlan { rows, plan, read })
    }

    /// Decode a transfer stream and load it into `platform`.
    pub async fn restore<R: BufRead>(
        &self,
        platform: Arc<dyn Platform>,
        input: R,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<RestoreResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let (rows, read) = self.reader().read_rows_with_stats(input)?;
        info!(
            "Restoring {} rows into {} ({} rows and {} values skipped)",
            read.rows,
            platform.name(),
            read.skipped_rows,
            read.skipped_columns
        );

        let mut loader = BulkLoader::new(platform, Arc::clone(&self.model), &self.config);
        if let Some(cancel) = cancel {
            loader = loader.with_cancel(cancel);
        }
        let load = loader.load(rows).await?;

        Ok(RestoreResult {
            run_id: load.session_id.clone(),
            started_at,
            completed_at: Utc::now(),
            read,
            load,
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Export every table of the model from `platform` into `output`.
    ///
    /// Tables are written in dependency order so that a restore of the
    /// stream only needs deferred references for genuine cycles.
    pub async fn backup<W: Write>(&self, platform: &dyn Platform, output: W) -> Result<BackupResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        let order = DependencyResolver::new(&self.model).table_order();
        info!(
            "Starting backup {}: {} tables from {}",
            run_id,
            order.len(),
            platform.name()
        );

        let mut writer = self.writer(output)?;
        let mut tables = Vec::with_capacity(order.len());
        for table in &order {
            let before = writer.rows_written();
            let mut rx = platform.fetch_rows(table);
            while let Some(row) = rx.recv().await {
                writer.write_row(&row?)?;
            }
            let rows = writer.rows_written() - before;
            info!("{}: exported {} rows", table.name, rows);
            tables.push(TableExport {
                table: table.name.clone(),
                rows,
            });
        }
        let rows_written = writer.rows_written();
        writer.finish()?;

        let result = BackupResult {
            run_id,
            started_at,
            completed_at: Utc::now(),
            tables,
            rows_written,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Backup {} complete: {} rows in {:.1}s",
            result.run_id, result.rows_written, result.duration_seconds
        );
        Ok(result)
    }

    /// Decode a transfer stream and write it back in canonical form.
    ///
    /// Returns the number of rows written.
    pub fn normalize<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<u64> {
        let rows = self.reader().read_rows(input)?;
        let mut writer = self.writer(output)?;
        writer.write_rows(&rows)?;
        let written = writer.rows_written();
        writer.finish()?;
        Ok(written)
    }
}
