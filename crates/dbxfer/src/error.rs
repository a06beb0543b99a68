//! Error types for the transfer library.

use thiserror::Error;

/// Main error type for backup and restore operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Configuration error (invalid YAML, bad encoding label, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model is inconsistent (foreign key to a missing table, two identity columns, ...)
    #[error("Schema error: {0}")]
    Schema(String),

    /// The transfer stream could not be decoded.
    #[error("Format error: {0}")]
    Format(String),

    /// Malformed markup in the transfer stream.
    #[error("Malformed transfer stream: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid Base64 payload.
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Text could not be represented in the requested character encoding.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Table is not part of the model.
    #[error("Unknown table {0}")]
    UnknownTable(String),

    /// Column lookup on a row of a table that lacks it.
    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// A foreign key value matched more than one buffered row.
    #[error("Ambiguous reference from {table} via {foreign_key}: key {key} matches {matches} rows")]
    AmbiguousReference {
        table: String,
        foreign_key: String,
        key: String,
        matches: usize,
    },

    /// Rows form a reference cycle made only of non-nullable foreign keys.
    #[error("Cyclic constraint violation between tables [{}]: rows {}", tables.join(", "), rows.join(", "))]
    CyclicConstraint { tables: Vec<String>, rows: Vec<String> },

    /// Table has no primary key (required to issue deferred updates)
    #[error("Table {0} has no primary key - deferred foreign key updates require primary keys")]
    NoPrimaryKey(String),

    /// An insert or update failed at the platform
    #[error("Platform write failed for table {table} (row {key}): {message}")]
    Platform {
        table: String,
        key: String,
        message: String,
    },

    /// Raw failure reported by a platform implementation.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal invariant broken during a load session.
    #[error("Internal consistency failure: {0}")]
    Consistency(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session was cancelled by the caller.
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a Platform error naming the offending row.
    pub fn platform(
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TransferError::Platform {
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a Format error.
    pub fn format(message: impl Into<String>) -> Self {
        TransferError::Format(message.into())
    }

    /// Create an UnknownColumn error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        TransferError::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Whether the error was raised before anything was written to the platform.
    pub fn is_pre_write(&self) -> bool {
        !matches!(
            self,
            TransferError::Platform { .. }
                | TransferError::Database(_)
                | TransferError::Consistency(_)
                | TransferError::Cancelled
        )
    }

    /// Process exit code used by the command-line tool.
    pub fn exit_code(&self) -> u8 {
        match self {
            TransferError::Config(_)
            | TransferError::Schema(_)
            | TransferError::Yaml(_)
            | TransferError::Json(_) => 1,
            TransferError::Format(_)
            | TransferError::Xml(_)
            | TransferError::Base64(_)
            | TransferError::Encoding(_)
            | TransferError::UnknownTable(_)
            | TransferError::UnknownColumn { .. } => 2,
            TransferError::AmbiguousReference { .. }
            | TransferError::CyclicConstraint { .. }
            | TransferError::NoPrimaryKey(_) => 3,
            TransferError::Platform { .. } | TransferError::Database(_) => 4,
            TransferError::Consistency(_) => 5,
            TransferError::Cancelled => 6,
            TransferError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_constraint_message_names_tables_and_rows() {
        let err = TransferError::CyclicConstraint {
            tables: vec!["a".into(), "b".into()],
            rows: vec!["a(id=1)".into(), "b(id=2)".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("[a, b]"));
        assert!(msg.contains("a(id=1), b(id=2)"));
        assert_eq!(err.exit_code(), 3);
        assert!(err.is_pre_write());
    }

    #[test]
    fn test_platform_error_is_not_pre_write() {
        let err = TransferError::platform("misc", "id=4", "duplicate key");
        assert_eq!(
            err.to_string(),
            "Platform write failed for table misc (row id=4): duplicate key"
        );
        assert!(!err.is_pre_write());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.xml");
        let err = TransferError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing.xml"));
        assert_eq!(err.exit_code(), 7);
    }
}
