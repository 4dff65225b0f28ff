//! Pool-level entry points: acquire, run, release; and transactions.

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::info;

use crate::driver::ConnectionPool;
use crate::error::SqlFragmentsError;
use crate::executor::Handle;
use crate::fragment::Fragment;
use crate::shape::{Shape, decode};

const INIT_EXPECTED: i64 = 2;

/// Query entry point over a connection pool.
///
/// Every operation checks out its own connection and returns it when done, so one `Db` can be
/// shared by many concurrent tasks. The first successful checkout runs a `SELECT 1+1` sanity
/// check; later checkouts skip it.
pub struct Db<P: ConnectionPool> {
    pool: P,
    database: Option<String>,
    ready: OnceCell<()>,
}

impl<P: ConnectionPool> Db<P> {
    #[must_use]
    pub fn new(pool: P) -> Self {
        Self {
            pool,
            database: None,
            ready: OnceCell::new(),
        }
    }

    /// Database name reported in the startup log.
    #[must_use]
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Run the startup check now instead of on first use.
    ///
    /// # Errors
    /// Returns `InitError` if the check query returns anything but `2`, or any error from
    /// acquiring a connection or running the check.
    pub async fn init(&self) -> Result<(), SqlFragmentsError> {
        self.acquire().await.map(drop)
    }

    /// Check out a standalone handle.
    ///
    /// # Errors
    /// Returns pool errors, or the startup check's error on first use.
    pub async fn acquire(&self) -> Result<Handle<P::Connection>, SqlFragmentsError> {
        let conn = self.pool.acquire().await?;
        let mut handle = Handle::standalone(conn);
        let database = self.database.as_deref();
        let checked = &mut handle;
        self.ready
            .get_or_try_init(|| verify_connection(checked, database))
            .await?;
        Ok(handle)
    }

    /// Stop handing out new connections.
    pub fn close(&self) {
        self.pool.close();
    }

    /// See [`Handle::none`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::none`].
    pub async fn none(&self, query: &Fragment) -> Result<u64, SqlFragmentsError> {
        self.acquire().await?.none(query).await
    }

    /// See [`Handle::row`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::row`].
    pub async fn row<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<S::Output, SqlFragmentsError> {
        self.acquire().await?.row(query, shape).await
    }

    /// See [`Handle::optional_row`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::optional_row`].
    pub async fn optional_row<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Option<S::Output>, SqlFragmentsError> {
        self.acquire().await?.optional_row(query, shape).await
    }

    /// See [`Handle::value`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::value`].
    pub async fn value<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<S::Output, SqlFragmentsError> {
        self.acquire().await?.value(query, shape).await
    }

    /// See [`Handle::optional_value`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::optional_value`].
    pub async fn optional_value<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Option<S::Output>, SqlFragmentsError> {
        self.acquire().await?.optional_value(query, shape).await
    }

    /// See [`Handle::rows`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::rows`].
    pub async fn rows<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Vec<S::Output>, SqlFragmentsError> {
        self.acquire().await?.rows(query, shape).await
    }

    /// See [`Handle::column`].
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::column`].
    pub async fn column<S: Shape>(
        &self,
        query: &Fragment,
        shape: &S,
    ) -> Result<Vec<S::Output>, SqlFragmentsError> {
        self.acquire().await?.column(query, shape).await
    }

    /// Run several statements on one standalone connection, outside any transaction.
    ///
    /// # Errors
    /// Pool errors, or the callback's error.
    pub async fn with_handle<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'h> FnOnce(&'h mut Handle<P::Connection>) -> BoxFuture<'h, Result<T, E>>,
        E: From<SqlFragmentsError>,
    {
        let mut handle = self.acquire().await?;
        f(&mut handle).await
    }

    /// Run `f` in a transaction on a freshly acquired connection.
    ///
    /// To nest, call [`Handle::transaction`] on the handle the callback receives; that reuses
    /// the open transaction instead of starting another one.
    ///
    /// # Errors
    /// Pool errors plus those of [`Handle::transaction`].
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'h> FnOnce(&'h mut Handle<P::Connection>) -> BoxFuture<'h, Result<T, E>>,
        E: From<SqlFragmentsError>,
    {
        let mut handle = self.acquire().await?;
        handle.transaction(f).await
    }
}

async fn verify_connection<C: crate::driver::Connection>(
    handle: &mut Handle<C>,
    database: Option<&str>,
) -> Result<(), SqlFragmentsError> {
    let check = crate::sql!("SELECT 1+1")?;
    let got = handle.value(&check, &decode::<i64>()).await?;
    info!(result = got, "database says 1+1 is {got}");
    if got != INIT_EXPECTED {
        return Err(SqlFragmentsError::InitError(format!(
            "expected {INIT_EXPECTED}, got {got}"
        )));
    }
    info!(
        "connected to database: {}",
        database.unwrap_or("((unknown))")
    );
    Ok(())
}
