//! # dbxfer
//!
//! Dependency-ordered relational data transfer.
//!
//! This library moves table rows between a database and a portable
//! markup transfer stream:
//!
//! - **Restore** buffers the rows of a stream, orders them so every row is
//!   inserted after the rows it references, and breaks reference cycles by
//!   inserting a nullable reference as NULL and patching it afterwards
//! - **Backup** exports tables in dependency order
//! - **Identity remapping** rewrites references when the target database
//!   generates new identity values
//! - **Lossless encoding** of names and values that markup cannot carry
//!   directly (Base64, generic elements, CDATA)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbxfer::{MemoryPlatform, Model, SessionConfig, TransferEngine};
//!
//! #[tokio::main]
//! async fn main() -> dbxfer::Result<()> {
//!     let model = Arc::new(Model::load("model.yaml")?);
//!     let engine = TransferEngine::new(Arc::clone(&model), SessionConfig::default())?;
//!     let platform = Arc::new(MemoryPlatform::new(model));
//!     let input = std::io::BufReader::new(std::fs::File::open("data.xml")?);
//!     let result = engine.restore(platform, input, None).await?;
//!     println!("Restored {} rows", result.load.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod graph;
pub mod loader;
pub mod platform;
pub mod transfer;

// Re-exports for convenient access
pub use codec::{DataReader, DataWriter, ReadStats, ValueCodec};
pub use config::SessionConfig;
pub use core::{
    Column, ColumnType, ForeignKey, KeyValue, Model, ObjectSerializer, Platform, Row, SqlNullType,
    SqlValue, Table,
};
pub use error::{Result, TransferError};
pub use graph::{DependencyResolver, FixUp, LoadPlan, TableGroup};
pub use loader::{BulkLoader, IdentityRemap, LoadStats};
pub use platform::{MemoryPlatform, WriteOp};
pub use transfer::{BackupResult, RestorePlan, RestoreResult, TransferEngine};
