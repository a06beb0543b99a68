//! Core abstractions for dependency-ordered data transfer.
//!
//! - [`schema`]: Model, table, column and foreign key metadata
//! - [`value`]: SQL value representation and canonical key form
//! - [`row`]: Rows bound to a table with schema-checked access
//! - [`traits`]: Collaborator seams (platform, object serializer)

pub mod row;
pub mod schema;
pub mod traits;
pub mod value;

pub use row::Row;
pub use schema::{
    names_match, Column, ColumnType, FkAction, ForeignKey, Index, Model, Reference, Table,
};
pub use traits::{ObjectSerializer, Platform, RawBytesSerializer};
pub use value::{KeyValue, SqlNullType, SqlValue};
