use std::env;
use std::time::Duration;

use deadpool_postgres::{Config as PgConfig, PoolConfig, Runtime};
use tokio_postgres::NoTls;

use super::PgPool;
use crate::db::Db;
use crate::error::SqlFragmentsError;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;

impl Db<PgPool> {
    /// Asynchronous initializer for `Db` with Postgres
    ///
    /// The pool connects lazily; the startup check runs on first acquire (or [`Db::init`]).
    ///
    /// # Errors
    /// Returns `SqlFragmentsError::ConfigError` if required config fields are missing or `SqlFragmentsError::ConnectionError` if pool creation fails.
    #[allow(clippy::unused_async)]
    pub async fn new_postgres(pg_config: PgConfig) -> Result<Self, SqlFragmentsError> {
        for (field, missing) in [
            ("dbname", pg_config.dbname.is_none()),
            ("host", pg_config.host.is_none()),
            ("port", pg_config.port.is_none()),
            ("user", pg_config.user.is_none()),
            ("password", pg_config.password.is_none()),
        ] {
            if missing {
                return Err(SqlFragmentsError::ConfigError(format!(
                    "{field} is required"
                )));
            }
        }

        let pg_pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                SqlFragmentsError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
            })?;

        let db = Db::new(PgPool::new(pg_pool));
        Ok(match pg_config.dbname {
            Some(name) => db.with_database_name(name),
            None => db,
        })
    }
}

/// Build a pool config from the libpq environment variables.
///
/// `PGHOST` defaults to `localhost` and `PGPORT` to `5432`; `PGUSER`, `PGPASSWORD`, and
/// `PGDATABASE` are passed through when set. `PGPOOL_MAX_SIZE` caps the pool and
/// `PGPOOL_WAIT_TIMEOUT_MS` bounds how long an acquire waits for a free connection.
///
/// # Errors
/// Returns `SqlFragmentsError::ConfigError` if a numeric variable does not parse.
pub fn postgres_config_from_env() -> Result<PgConfig, SqlFragmentsError> {
    config_from_lookup(|key| env::var(key).ok())
}

fn config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PgConfig, SqlFragmentsError> {
    let mut cfg = PgConfig::new();
    cfg.host = Some(lookup("PGHOST").unwrap_or_else(|| DEFAULT_HOST.to_string()));
    cfg.port = Some(parse_var(&lookup, "PGPORT")?.unwrap_or(DEFAULT_PORT));
    cfg.user = lookup("PGUSER");
    cfg.password = lookup("PGPASSWORD");
    cfg.dbname = lookup("PGDATABASE");

    let max_size: Option<usize> = parse_var(&lookup, "PGPOOL_MAX_SIZE")?;
    let wait_ms: Option<u64> = parse_var(&lookup, "PGPOOL_WAIT_TIMEOUT_MS")?;
    if max_size.is_some() || wait_ms.is_some() {
        let mut pool = max_size.map_or_else(PoolConfig::default, PoolConfig::new);
        pool.timeouts.wait = wait_ms.map(Duration::from_millis);
        cfg.pool = Some(pool);
    }
    Ok(cfg)
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, SqlFragmentsError> {
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                SqlFragmentsError::ConfigError(format!("{key} is not a valid number: {raw:?}"))
            })
        })
        .transpose()
}
