//! Rows bound to a table.

use std::fmt;
use std::sync::Arc;

use super::schema::Table;
use super::value::{SqlNullType, SqlValue};
use crate::error::{Result, TransferError};

/// A row of one table.
///
/// Values are stored positionally, one slot per column of the table; an
/// unset column holds `SqlValue::Null`. Lookups by name go through the
/// table definition and fail for columns the table does not have.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: Arc<Table>,
    values: Vec<SqlValue<'static>>,
}

impl Row {
    /// Create a row with every column NULL.
    pub fn new(table: Arc<Table>) -> Self {
        let values = table
            .columns
            .iter()
            .map(|_| SqlValue::Null(SqlNullType::String))
            .collect();
        Self { table, values }
    }

    /// Create a row from `(column, value)` pairs, matching names exactly.
    pub fn from_pairs<I, V>(table: Arc<Table>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<SqlValue<'static>>,
    {
        let mut row = Row::new(table);
        for (name, value) in pairs {
            row.set(name, value.into())?;
        }
        Ok(row)
    }

    /// The table this row belongs to.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Name of the table this row belongs to.
    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// All values in column order.
    pub fn values(&self) -> &[SqlValue<'static>] {
        &self.values
    }

    /// Value at a column position.
    pub fn value_at(&self, idx: usize) -> &SqlValue<'static> {
        &self.values[idx]
    }

    /// Replace the value at a column position.
    pub fn set_at(&mut self, idx: usize, value: SqlValue<'static>) {
        self.values[idx] = value;
    }

    /// Value of the named column (exact name match).
    pub fn get(&self, column: &str) -> Result<&SqlValue<'static>> {
        let idx = self.index_of(column)?;
        Ok(&self.values[idx])
    }

    /// Set the named column (exact name match).
    pub fn set(&mut self, column: &str, value: SqlValue<'static>) -> Result<()> {
        let idx = self.index_of(column)?;
        self.values[idx] = value;
        Ok(())
    }

    /// Set the named column to NULL.
    pub fn clear(&mut self, column: &str) -> Result<()> {
        let idx = self.index_of(column)?;
        self.values[idx] = self.values[idx].to_null();
        Ok(())
    }

    /// `(name, value)` pairs of the primary key columns.
    pub fn primary_key(&self) -> Vec<(String, SqlValue<'static>)> {
        self.table
            .primary_key_indices()
            .into_iter()
            .map(|idx| (self.table.columns[idx].name.clone(), self.values[idx].clone()))
            .collect()
    }

    /// Short human readable identification, e.g. `misc(id=4)`.
    ///
    /// Uses the primary key when there is one, otherwise the first few
    /// non-null columns.
    pub fn describe(&self) -> String {
        format!("{}({})", self.table.name, self.key_description())
    }

    /// The key part of [`describe`](Self::describe), e.g. `id=4`.
    pub fn key_description(&self) -> String {
        let pk = self.table.primary_key_indices();
        let indices: Vec<usize> = if pk.is_empty() {
            (0..self.values.len())
                .filter(|idx| !self.values[*idx].is_null())
                .take(3)
                .collect()
        } else {
            pk
        };
        indices
            .iter()
            .map(|idx| format!("{}={}", self.table.columns[*idx].name, self.values[*idx]))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn index_of(&self, column: &str) -> Result<usize> {
        self.table
            .column_index(column, true)
            .ok_or_else(|| TransferError::unknown_column(&self.table.name, column))
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, ColumnType};

    fn table() -> Arc<Table> {
        Arc::new(Table::new(
            "misc",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("parent", ColumnType::Integer),
            ],
        ))
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let mut row = Row::new(table());
        let err = row.set("nope", SqlValue::I32(1)).unwrap_err();
        assert!(matches!(err, TransferError::UnknownColumn { .. }));
        assert!(row.get("nope").is_err());
    }

    #[test]
    fn test_unset_columns_are_null() {
        let row = Row::from_pairs(table(), [("id", 4)]).unwrap();
        assert!(row.get("parent").unwrap().is_null());
        assert_eq!(row.get("id").unwrap(), &SqlValue::I32(4));
        assert_eq!(row.describe(), "misc(id=4)");
    }

    #[test]
    fn test_rows_compare_by_table_and_values() {
        let a = Row::from_pairs(table(), [("id", 1), ("parent", 2)]).unwrap();
        let b = Row::from_pairs(table(), [("id", 1), ("parent", 2)]).unwrap();
        assert_eq!(a, b);

        let c = Row::from_pairs(table(), [("id", 1)]).unwrap();
        assert_ne!(a, c);

        let renamed = Arc::new(Table::new("other", table().columns.clone()));
        let d = Row::from_pairs(renamed, [("id", 1), ("parent", 2)]).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_clear_keeps_null_type() {
        let mut row = Row::from_pairs(table(), [("id", 4i64), ("parent", 1i64)]).unwrap();
        row.clear("parent").unwrap();
        assert_eq!(row.get("parent").unwrap(), &SqlValue::Null(SqlNullType::I64));
        assert_eq!(row.primary_key(), vec![("id".to_string(), SqlValue::I64(4))]);
    }
}
