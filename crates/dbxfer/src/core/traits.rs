//! Collaborator traits for data transfer.
//!
//! - [`Platform`]: executes inserts, updates and selects against a live database
//! - [`ObjectSerializer`]: turns opaque object column values into bytes and back
//!
//! The core never issues DDL and never interprets the structure of object
//! values; both concerns live behind these seams.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, TransferError};

use super::row::Row;
use super::schema::Table;
use super::value::SqlValue;

/// Database access used by the loader (restore) and the exporter (backup).
///
/// # Write ordering
///
/// The loader awaits every call before issuing the next one, so
/// implementations never see overlapping writes from a single session.
///
/// # Identity columns
///
/// When the loader lets the platform generate an identity value, the row
/// passed to [`insert`](Self::insert) holds NULL in that column and the
/// implementation must omit it from the INSERT and return the generated
/// value.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Insert one row.
    ///
    /// Returns the generated identity value when the table has an identity
    /// column that was left NULL, `None` otherwise.
    async fn insert(&self, table: &Table, row: &Row) -> Result<Option<SqlValue<'static>>>;

    /// Update the row identified by `key` (primary key column/value pairs),
    /// setting each `(column, value)` of `values`.
    async fn update(
        &self,
        table: &Table,
        key: &[(String, SqlValue<'static>)],
        values: &[(String, SqlValue<'static>)],
    ) -> Result<()>;

    /// Start streaming the rows of a table.
    ///
    /// Returns a channel receiver yielding rows until the table is exhausted.
    /// The order of rows is whatever the database returns.
    fn fetch_rows(&self, table: &Table) -> mpsc::Receiver<Result<Row>>;

    /// Platform identifier for logging (e.g. "postgres", "memory").
    fn name(&self) -> &str;
}

/// Serializer for `object` columns.
///
/// Object values are carried as opaque bytes; how a value becomes bytes is
/// up to the implementation.
pub trait ObjectSerializer: Send + Sync {
    /// Serialize an object value to bytes.
    fn to_bytes(&self, value: &SqlValue<'_>) -> Result<Vec<u8>>;

    /// Rebuild an object value from bytes.
    fn from_bytes(&self, bytes: Vec<u8>) -> Result<SqlValue<'static>>;
}

/// Object serializer that carries byte values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesSerializer;

impl ObjectSerializer for RawBytesSerializer {
    fn to_bytes(&self, value: &SqlValue<'_>) -> Result<Vec<u8>> {
        match value {
            SqlValue::Bytes(bytes) => Ok(bytes.to_vec()),
            SqlValue::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(TransferError::format(format!(
                "object column expects bytes, got {other}"
            ))),
        }
    }

    fn from_bytes(&self, bytes: Vec<u8>) -> Result<SqlValue<'static>> {
        Ok(SqlValue::bytes_owned(bytes))
    }
}
