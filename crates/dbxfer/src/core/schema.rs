//! Model types for tables, columns, foreign keys and indexes.
//!
//! The model is supplied by an external collaborator (usually read from the
//! live database or from a YAML description) and is immutable for the
//! duration of a transfer session.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    #[serde(alias = "numeric")]
    Decimal,
    Real,
    #[serde(alias = "double")]
    Float,
    Char,
    Varchar,
    #[serde(alias = "clob")]
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    Varbinary,
    #[serde(alias = "blob")]
    LongVarbinary,
    Object,
}

impl ColumnType {
    /// Whether values of this type are carried as raw bytes.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            ColumnType::Binary | ColumnType::Varbinary | ColumnType::LongVarbinary | ColumnType::Object
        )
    }
}

/// Referential action tag. Informational only: enforcement is left to the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FkAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Semantic type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,

    /// Whether the column value is generated by the database on insert.
    #[serde(default)]
    pub is_identity: bool,

    /// Default value, as written in the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Column {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_nullable: true,
            is_primary_key: false,
            is_identity: false,
            default_value: None,
        }
    }

    /// Mark the column as (non-null) primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    /// Mark the column as database-generated.
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Mark the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// One (local column, referenced column) pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Column in the owning table.
    pub local: String,
    /// Column in the referenced table.
    pub foreign: String,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Referenced table name.
    pub foreign_table: String,

    /// Ordered column pairs.
    pub references: Vec<Reference>,

    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: FkAction,

    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: FkAction,
}

impl ForeignKey {
    /// Create a foreign key to `foreign_table` over the given column pairs.
    pub fn new(foreign_table: impl Into<String>, pairs: &[(&str, &str)]) -> Self {
        Self {
            name: None,
            foreign_table: foreign_table.into(),
            references: pairs
                .iter()
                .map(|(local, foreign)| Reference {
                    local: (*local).to_string(),
                    foreign: (*foreign).to_string(),
                })
                .collect(),
            on_delete: FkAction::default(),
            on_update: FkAction::default(),
        }
    }

    /// Name for diagnostics: the constraint name, or the local columns.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "({})->{}",
                self.local_columns().collect::<Vec<_>>().join(","),
                self.foreign_table
            ),
        }
    }

    /// Local column names in order.
    pub fn local_columns(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.local.as_str())
    }

    /// Referenced column names in order.
    pub fn foreign_columns(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.foreign.as_str())
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed column names.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    #[serde(default)]
    pub is_unique: bool,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions.
    pub columns: Vec<Column>,

    /// Foreign key constraints.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Non-primary key indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    /// Create a table without foreign keys.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Position of a column, honoring the case-sensitivity mode.
    pub fn column_index(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| names_match(&c.name, name, case_sensitive))
    }

    /// Find a column by name.
    pub fn find_column(&self, name: &str, case_sensitive: bool) -> Option<&Column> {
        self.column_index(name, case_sensitive)
            .map(|idx| &self.columns[idx])
    }

    /// Primary key column positions.
    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Position of the identity column, if any.
    pub fn identity_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_identity)
    }
}

/// Database model: the ordered set of tables a session works on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    #[serde(default)]
    pub name: String,

    /// Tables in definition order.
    pub tables: Vec<Arc<Table>>,
}

impl Model {
    /// Create a model from tables.
    pub fn new(name: impl Into<String>, tables: Vec<Table>) -> Self {
        Self {
            name: name.into(),
            tables: tables.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a model from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a model from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let model: Model = serde_yaml::from_str(yaml)?;
        model.validate()?;
        Ok(model)
    }

    /// Tables in definition order.
    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    /// Position of a table, honoring the case-sensitivity mode.
    pub fn table_index(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| names_match(&t.name, name, case_sensitive))
    }

    /// Find a table by name.
    pub fn find_table(&self, name: &str, case_sensitive: bool) -> Option<&Arc<Table>> {
        self.table_index(name, case_sensitive)
            .map(|idx| &self.tables[idx])
    }

    /// Check the structural rules dependency resolution relies on.
    ///
    /// Foreign keys must point at known tables and columns, column counts
    /// must agree, and identity columns must be single primary-key columns.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.name.is_empty() {
                return Err(TransferError::Schema("table name cannot be empty".into()));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(TransferError::Schema(format!(
                    "table {} is defined twice",
                    table.name
                )));
            }

            let identities: Vec<&Column> =
                table.columns.iter().filter(|c| c.is_identity).collect();
            if identities.len() > 1 {
                return Err(TransferError::Schema(format!(
                    "table {} has {} identity columns, at most one is allowed",
                    table.name,
                    identities.len()
                )));
            }
            if let Some(col) = identities.first() {
                if !col.is_primary_key {
                    return Err(TransferError::Schema(format!(
                        "identity column {}.{} must be part of the primary key",
                        table.name, col.name
                    )));
                }
            }

            for fk in &table.foreign_keys {
                if fk.references.is_empty() {
                    return Err(TransferError::Schema(format!(
                        "foreign key {} of table {} has no columns",
                        fk.display_name(),
                        table.name
                    )));
                }
                let target = self
                    .tables
                    .iter()
                    .find(|t| t.name == fk.foreign_table)
                    .ok_or_else(|| {
                        TransferError::Schema(format!(
                            "foreign key {} of table {} references unknown table {}",
                            fk.display_name(),
                            table.name,
                            fk.foreign_table
                        ))
                    })?;
                for reference in &fk.references {
                    if table.find_column(&reference.local, true).is_none() {
                        return Err(TransferError::Schema(format!(
                            "foreign key {} references unknown local column {}.{}",
                            fk.display_name(),
                            table.name,
                            reference.local
                        )));
                    }
                    if target.find_column(&reference.foreign, true).is_none() {
                        return Err(TransferError::Schema(format!(
                            "foreign key {} references unknown column {}.{}",
                            fk.display_name(),
                            target.name,
                            reference.foreign
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Compare two identifiers under the configured case-sensitivity mode.
pub fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

fn default_true() -> bool {
    true
}
