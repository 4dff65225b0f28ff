use postgresql_embedded::PostgreSQL;
use tokio::runtime::Runtime;

use crate::db::Db;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Working pool configuration with the embedded server's host, port, and credentials.
    pub config: deadpool_postgres::Config,
}

/// Set up an embedded `PostgreSQL` instance for testing or benchmarking.
///
/// Blocks on its own runtime, so call it from synchronous test code before entering one.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, if `dbname` is
/// missing from `cfg`, or if the post-start connectivity check fails.
pub fn setup_postgres_embedded(
    cfg: &deadpool_postgres::Config,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let db_name = cfg
        .dbname
        .clone()
        .ok_or("dbname is required to create the test database")?;

    Runtime::new()?.block_on(async {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let host = settings.host.clone();
        let user = settings.username.clone();
        let password = settings.password.clone();

        postgresql.create_database(&db_name).await?;

        let database_url = format!("postgres://{user}:{password}@{host}:{port}/{db_name}");
        tracing::info!(port, "embedded PostgreSQL started");

        let mut final_cfg = cfg.clone();
        final_cfg.port = Some(port);
        final_cfg.host = Some(host);
        final_cfg.user = Some(user);
        final_cfg.password = Some(password);

        // the pool is lazy; force one round trip before handing the server out
        let db = Db::new_postgres(final_cfg.clone()).await?;
        db.init().await?;
        db.close();

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            database_url,
            config: final_cfg,
        })
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Ok(rt) = Runtime::new() {
        rt.block_on(async move {
            let _ = postgresql.stop().await;
        });
    }
}
