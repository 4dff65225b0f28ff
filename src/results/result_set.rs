use std::sync::Arc;

use super::row::DbRow;
use crate::types::SqlValue;

/// A result set from a database query
///
/// Holds the returned rows in driver order plus the affected-row count reported by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: u64,
    /// Column names shared by all rows
    column_names: Arc<Vec<String>>,
}

impl ResultSet {
    /// Create an empty result set for the given columns with a known row capacity
    #[must_use]
    pub fn with_columns(column_names: Vec<String>, capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: Arc::new(column_names),
        }
    }

    /// Result of a statement that returned no rows.
    #[must_use]
    pub fn affected(rows_affected: u64) -> ResultSet {
        ResultSet {
            rows_affected,
            ..ResultSet::default()
        }
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Number of columns described by the statement
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Add a row to the result set
    pub fn add_row_values(&mut self, row_values: Vec<SqlValue>) {
        self.results
            .push(DbRow::new(Arc::clone(&self.column_names), row_values));
    }

    /// Set the affected-row count and return the result set.
    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> ResultSet {
        self.rows_affected = rows_affected;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_share_columns_and_render_json() {
        let mut rs = ResultSet::with_columns(vec!["id".into(), "name".into()], 1);
        rs.add_row_values(vec![SqlValue::Int(1), SqlValue::Text("a".into())]);
        let row = &rs.results[0];
        assert_eq!(row.get("name").and_then(SqlValue::as_text), Some("a"));
        assert_eq!(row.to_json_object(), json!({"id": 1, "name": "a"}));
        assert_eq!(row.to_json_array(), json!([1, "a"]));
        assert!(Arc::ptr_eq(&row.column_names, rs.get_column_names()));
    }
}
