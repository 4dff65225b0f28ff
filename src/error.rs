use thiserror::Error;

use crate::driver::DriverError;
use crate::fragment::ParsedStatement;
use crate::types::SqlValue;

#[derive(Debug, Error)]
pub enum SqlFragmentsError {
    /// Malformed fragment input, e.g. an empty parameter sequence.
    #[error("sql fragment error: {0}")]
    ConstructionError(String),

    /// A single-row fetch required a row and got none.
    #[error("db return error: expected 1 row, got 0. query: {query:?}")]
    RowNotFound { query: String },

    /// Wrong number of rows or columns for the fetch variant.
    #[error("db return error: expected {expected}; got {actual}. query: {query:?}")]
    CardinalityError {
        expected: &'static str,
        actual: usize,
        query: String,
    },

    /// A row or cell did not match the requested shape.
    #[error(
        "db return parsing error: {issue} -- {}",
        describe_context(.query, .value, .row_index)
    )]
    ValidationError {
        issue: String,
        value: String,
        query: String,
        row_index: Option<usize>,
    },

    /// The driver rejected the statement or lost the connection.
    #[error(
        "db query failed: {message} position={} text={query:?} values={}",
        describe_position(.position),
        describe_values(.values)
    )]
    DatabaseError {
        message: String,
        position: Option<u32>,
        query: String,
        values: Vec<SqlValue>,
    },

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("db setup failed: {0}")]
    InitError(String),
}

impl SqlFragmentsError {
    /// True for the "required row was missing" case.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RowNotFound { .. })
    }

    /// True for row/column count mismatches and shape validation failures.
    #[must_use]
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::CardinalityError { .. } | Self::ValidationError { .. }
        )
    }

    /// Rewrap a driver error with the statement that caused it.
    pub(crate) fn from_driver(err: DriverError, statement: &ParsedStatement) -> Self {
        Self::DatabaseError {
            message: err.message,
            position: err.position,
            query: statement.text().to_string(),
            values: statement.values().to_vec(),
        }
    }

    /// Rewrap a driver error raised by a bare control statement (BEGIN/COMMIT/ROLLBACK).
    pub(crate) fn from_driver_command(err: DriverError, command: &str) -> Self {
        Self::DatabaseError {
            message: err.message,
            position: err.position,
            query: command.to_string(),
            values: Vec::new(),
        }
    }
}

fn describe_context(query: &str, value: &str, row_index: &Option<usize>) -> String {
    match row_index {
        Some(idx) => format!("(query={query}; value={value}; row_index={idx})"),
        None => format!("(query={query}; value={value})"),
    }
}

fn describe_position(position: &Option<u32>) -> String {
    position.map_or_else(|| "none".to_string(), |p| p.to_string())
}

fn describe_values(values: &[SqlValue]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_carries_context() {
        let err = SqlFragmentsError::DatabaseError {
            message: "syntax error at or near \"SELEC\"".into(),
            position: Some(1),
            query: "SELEC $1".into(),
            values: vec![SqlValue::Int(4), SqlValue::Text("x".into())],
        };
        assert_eq!(
            err.to_string(),
            "db query failed: syntax error at or near \"SELEC\" position=1 text=\"SELEC $1\" values=4,x"
        );
    }

    #[test]
    fn validation_error_names_row() {
        let err = SqlFragmentsError::ValidationError {
            issue: "(path=id; message=invalid type)".into(),
            value: "{\"id\":\"a\"}".into(),
            query: "SELECT id FROM t".into(),
            row_index: Some(2),
        };
        let text = err.to_string();
        assert!(text.starts_with("db return parsing error: (path=id; message=invalid type)"));
        assert!(text.ends_with("row_index=2)"));
        assert!(err.is_shape_error());
        assert!(!err.is_not_found());
    }
}
