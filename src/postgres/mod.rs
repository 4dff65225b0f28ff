// PostgreSQL adapter - implements the driver traits on top of deadpool-postgres
//
// - config: pool configuration, env loading, `Db` constructor
// - numeric: binary `numeric` codec (decimal text in and out)
// - params: `SqlValue` binding
// - query: row extraction and error mapping

pub mod config;
pub mod numeric;
pub mod params;
pub mod query;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};

use crate::driver::{Connection, ConnectionPool, DriverError};
use crate::error::SqlFragmentsError;
use crate::fragment::ParsedStatement;
use crate::results::ResultSet;

pub use config::postgres_config_from_env;
pub use params::Params;
pub use query::build_result_set;

/// A `deadpool_postgres` pool as a [`ConnectionPool`].
#[derive(Clone)]
pub struct PgPool(Pool);

impl PgPool {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self(pool)
    }

    /// The wrapped deadpool pool, e.g. for `status()`.
    #[must_use]
    pub fn inner(&self) -> &Pool {
        &self.0
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PgConnection;

    async fn acquire(&self) -> Result<PgConnection, SqlFragmentsError> {
        let client = self.0.get().await?;
        Ok(PgConnection(client))
    }

    fn close(&self) {
        self.0.close();
    }
}

/// A pooled Postgres client. Dropping it hands the client back to the pool.
pub struct PgConnection(Object);

#[async_trait]
impl Connection for PgConnection {
    async fn query(&mut self, statement: &ParsedStatement) -> Result<ResultSet, DriverError> {
        let prepared = self
            .0
            .prepare_cached(statement.text())
            .await
            .map_err(|e| query::driver_error(&e))?;
        let params = Params::convert(statement.values());
        let stream = self
            .0
            .query_raw(&prepared, params.as_refs().iter().copied())
            .await
            .map_err(|e| query::driver_error(&e))?;
        build_result_set(&prepared, stream).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.0
            .batch_execute(sql)
            .await
            .map_err(|e| query::driver_error(&e))
    }

    fn discard(self) {
        // detached from the pool, the client closes when dropped
        drop(Object::take(self.0));
    }
}
