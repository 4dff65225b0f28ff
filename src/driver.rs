//! The boundary to the database client and its pool.
//!
//! The executor only needs two things from a connection: run one parameterized statement and
//! return its rows, and run a bare control command (`BEGIN`, `COMMIT`, `ROLLBACK`).

use std::fmt;

use async_trait::async_trait;

use crate::error::SqlFragmentsError;
use crate::fragment::ParsedStatement;
use crate::results::ResultSet;

/// Error reported by the driver. Only the message and cursor position are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    /// 1-based character offset into the statement text, when the server reports one.
    pub position: Option<u32>,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} (position {pos})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// A single connection checked out of a pool.
///
/// Dropping the value returns it to the pool.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Execute a parameterized statement and collect every returned row.
    async fn query(&mut self, statement: &ParsedStatement) -> Result<ResultSet, DriverError>;

    /// Execute unparameterized SQL, discarding any rows.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Close the connection instead of returning it to the pool. Used when it may still
    /// hold an open transaction.
    fn discard(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// A pool that hands out [`Connection`]s.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Connection: Connection;

    /// Check out a connection, waiting for one to become free if needed.
    async fn acquire(&self) -> Result<Self::Connection, SqlFragmentsError>;

    /// Stop handing out connections. Already checked-out ones stay usable.
    fn close(&self) {}
}
