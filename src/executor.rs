//! Statement execution on one checked-out connection.

use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::driver::Connection;
use crate::error::SqlFragmentsError;
use crate::fragment::{Fragment, ParsedStatement};
use crate::results::ResultSet;
use crate::shape::Shape;

/// Whether a [`Handle`] currently sits inside an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Standalone,
    Transactional,
}

/// A connection owned for the duration of one acquire/release or one transaction.
///
/// Dropping a handle returns its connection to the pool. If it is dropped while still
/// transactional (for example because the surrounding future was cancelled), a `ROLLBACK`
/// is spawned on the current Tokio runtime first.
pub struct Handle<C: Connection> {
    conn: Option<C>,
    state: HandleState,
}

impl<C: Connection> Handle<C> {
    /// Wrap a freshly acquired connection.
    #[must_use]
    pub fn standalone(conn: C) -> Self {
        Self {
            conn: Some(conn),
            state: HandleState::Standalone,
        }
    }

    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state == HandleState::Transactional
    }

    /// Run a statement that must not return rows; yields the affected-row count.
    ///
    /// # Errors
    /// Returns `CardinalityError` if any row comes back, or `DatabaseError` from the driver.
    pub async fn none(&mut self, query: &Fragment) -> Result<u64, SqlFragmentsError> {
        let statement = query.parse();
        let rs = self.run(&statement).await?;
        if !rs.results.is_empty() {
            return Err(SqlFragmentsError::CardinalityError {
                expected: "no rows",
                actual: rs.results.len(),
                query: statement.text().to_string(),
            });
        }
        Ok(rs.rows_affected)
    }

    /// Fetch exactly one row and decode it.
    ///
    /// # Errors
    /// Returns `RowNotFound` on zero rows, `CardinalityError` on more than one, and
    /// `ValidationError` if the row does not fit `shape`.
    pub async fn row<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<S::Output, SqlFragmentsError> {
        let statement = query.parse();
        match self.single_row(&statement, false).await? {
            Some(row) => decode(shape, &row, &statement, None),
            None => Err(not_found(&statement)),
        }
    }

    /// Like [`Handle::row`], but zero rows yields `None`.
    ///
    /// # Errors
    /// Returns `CardinalityError` on more than one row and `ValidationError` on a shape mismatch.
    pub async fn optional_row<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Option<S::Output>, SqlFragmentsError> {
        let statement = query.parse();
        match self.single_row(&statement, false).await? {
            Some(row) => decode(shape, &row, &statement, None).map(Some),
            None => Ok(None),
        }
    }

    /// Fetch exactly one row with exactly one column and decode that cell.
    ///
    /// # Errors
    /// Returns `RowNotFound` on zero rows, `CardinalityError` on a wrong row or column count,
    /// and `ValidationError` if the cell does not fit `shape`.
    pub async fn value<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<S::Output, SqlFragmentsError> {
        let statement = query.parse();
        match self.single_row(&statement, true).await? {
            Some(cell) => decode(shape, &cell, &statement, None),
            None => Err(not_found(&statement)),
        }
    }

    /// Like [`Handle::value`], but zero rows yields `None`.
    ///
    /// # Errors
    /// Returns `CardinalityError` on a wrong row or column count and `ValidationError` on a
    /// shape mismatch.
    pub async fn optional_value<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Option<S::Output>, SqlFragmentsError> {
        let statement = query.parse();
        match self.single_row(&statement, true).await? {
            Some(cell) => decode(shape, &cell, &statement, None).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every returned row, in driver order. Zero rows is an empty vector.
    ///
    /// # Errors
    /// Returns `ValidationError` naming the first row that does not fit `shape`.
    pub async fn rows<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Vec<S::Output>, SqlFragmentsError> {
        let statement = query.parse();
        let rs = self.run(&statement).await?;
        rs.results
            .iter()
            .enumerate()
            .map(|(idx, row)| decode(shape, &row.to_json_object(), &statement, Some(idx)))
            .collect()
    }

    /// Decode the single column of every returned row.
    ///
    /// # Errors
    /// Returns `CardinalityError` before decoding anything if rows have more or fewer than one
    /// column, and `ValidationError` naming the first cell that does not fit `shape`.
    pub async fn column<S: Shape>(
        &mut self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Vec<S::Output>, SqlFragmentsError> {
        let statement = query.parse();
        let rs = self.run(&statement).await?;
        if let Some(first) = rs.results.first()
            && first.len() != 1
        {
            return Err(SqlFragmentsError::CardinalityError {
                expected: "1 column",
                actual: first.len(),
                query: statement.text().to_string(),
            });
        }
        rs.results
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let cell = row.get_by_index(0).map_or(JsonValue::Null, |v| v.to_json());
                decode(shape, &cell, &statement, Some(idx))
            })
            .collect()
    }

    /// Run `f` inside a transaction on this handle.
    ///
    /// If the handle is already transactional the callback runs directly on it, so nested
    /// requests share the single outer `BEGIN`/`COMMIT`. Otherwise `BEGIN` is issued, then
    /// `COMMIT` on success or `ROLLBACK` on failure; the callback's error is returned
    /// unchanged. A failed `COMMIT` is followed by `ROLLBACK` and its error is returned.
    ///
    /// ```rust,no_run
    /// # use sql_fragments::prelude::*;
    /// # async fn demo<C: Connection>(handle: &mut Handle<C>) -> Result<(), SqlFragmentsError> {
    /// let insert = sql!("INSERT INTO runs (status) VALUES (", "queued", ")")?;
    /// handle
    ///     .transaction(move |tx| {
    ///         Box::pin(async move {
    ///             tx.none(&insert).await?;
    ///             Ok::<_, SqlFragmentsError>(())
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the callback's error, or a `DatabaseError` from `BEGIN`/`COMMIT`.
    pub async fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'h> FnOnce(&'h mut Handle<C>) -> BoxFuture<'h, Result<T, E>>,
        E: From<SqlFragmentsError>,
    {
        if self.in_transaction() {
            debug!("transaction requested inside an open transaction; reusing it");
            return f(self).await;
        }

        self.begin().await?;
        match f(self).await {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.rollback().await;
                    Err(err.into())
                }
            },
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        }
    }

    async fn begin(&mut self) -> Result<(), SqlFragmentsError> {
        self.command("BEGIN").await?;
        self.state = HandleState::Transactional;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlFragmentsError> {
        self.command("COMMIT").await?;
        self.state = HandleState::Standalone;
        Ok(())
    }

    /// Best-effort; a failure keeps the handle transactional so the drop guard retries.
    async fn rollback(&mut self) {
        match self.command("ROLLBACK").await {
            Ok(()) => self.state = HandleState::Standalone,
            Err(err) => warn!(error = %err, "rollback failed"),
        }
    }

    async fn command(&mut self, sql: &'static str) -> Result<(), SqlFragmentsError> {
        self.conn_mut()?
            .batch_execute(sql)
            .await
            .map_err(|err| SqlFragmentsError::from_driver_command(err, sql))
    }

    /// Zero or one row. `scalar` additionally requires exactly one column and returns the
    /// cell instead of the row object.
    async fn single_row(
        &mut self,
        statement: &ParsedStatement,
        scalar: bool,
    ) -> Result<Option<JsonValue>, SqlFragmentsError> {
        let rs = self.run(statement).await?;
        let row = match rs.results.as_slice() {
            [] => return Ok(None),
            [row] => row,
            rows => {
                return Err(SqlFragmentsError::CardinalityError {
                    expected: "1 row",
                    actual: rows.len(),
                    query: statement.text().to_string(),
                });
            }
        };
        if !scalar {
            return Ok(Some(row.to_json_object()));
        }
        match row.values.as_slice() {
            [cell] => Ok(Some(cell.to_json())),
            cells => Err(SqlFragmentsError::CardinalityError {
                expected: "1 column",
                actual: cells.len(),
                query: statement.text().to_string(),
            }),
        }
    }

    async fn run(&mut self, statement: &ParsedStatement) -> Result<ResultSet, SqlFragmentsError> {
        let transactional = self.in_transaction();
        debug!(
            statement = statement.name(),
            params = statement.values().len(),
            transactional,
            "executing statement"
        );
        self.conn_mut()?.query(statement).await.map_err(|err| {
            warn!(
                statement = statement.name(),
                error = %err,
                "database rejected statement"
            );
            SqlFragmentsError::from_driver(err, statement)
        })
    }

    fn conn_mut(&mut self) -> Result<&mut C, SqlFragmentsError> {
        self.conn.as_mut().ok_or_else(|| {
            SqlFragmentsError::ConnectionError("connection already released".into())
        })
    }
}

impl<C: Connection> Drop for Handle<C> {
    fn drop(&mut self) {
        if self.state != HandleState::Transactional {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("handle dropped inside an open transaction outside a runtime; discarding connection");
            conn.discard();
            return;
        };
        warn!("handle dropped inside an open transaction; rolling back");
        runtime.spawn(async move {
            if let Err(err) = conn.batch_execute("ROLLBACK").await {
                warn!(error = %err, "rollback after drop failed; discarding connection");
                conn.discard();
            }
        });
    }
}

fn not_found(statement: &ParsedStatement) -> SqlFragmentsError {
    SqlFragmentsError::RowNotFound {
        query: statement.text().to_string(),
    }
}

fn decode<S: Shape>(
    shape: &S,
    value: &JsonValue,
    statement: &ParsedStatement,
    row_index: Option<usize>,
) -> Result<S::Output, SqlFragmentsError> {
    shape
        .parse(value)
        .map_err(|err| SqlFragmentsError::ValidationError {
            issue: err.describe_first(),
            value: value.to_string(),
            query: statement.text().to_string(),
            row_index,
        })
}
