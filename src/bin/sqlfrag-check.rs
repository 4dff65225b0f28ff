use std::process::ExitCode;

use clap::Parser;
use sql_fragments::prelude::*;
use sql_fragments::statement_name::statement_name;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Check Postgres connectivity, or preview the statement name derived for a query"
)]
struct Args {
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    host: String,
    #[arg(long, env = "PGPORT", default_value_t = 5432)]
    port: u16,
    #[arg(long, env = "PGUSER")]
    user: Option<String>,
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "PGDATABASE")]
    dbname: Option<String>,
    /// Print the statement name for this SQL text and exit without connecting.
    #[arg(long, value_name = "SQL")]
    name: Option<String>,
    /// Log every executed statement.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    if let Some(sql) = args.name.as_deref() {
        println!("{}", statement_name(sql));
        return ExitCode::SUCCESS;
    }

    match check(&args).await {
        Ok(version) => {
            println!("{version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("sqlfrag-check: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn check(args: &Args) -> Result<String, SqlFragmentsError> {
    // pool sizing and wait timeout still come from PGPOOL_* variables
    let mut cfg = postgres_config_from_env()?;
    cfg.host = Some(args.host.clone());
    cfg.port = Some(args.port);
    cfg.user.clone_from(&args.user);
    cfg.password.clone_from(&args.password);
    cfg.dbname.clone_from(&args.dbname);

    let db = Db::new_postgres(cfg).await?;
    db.init().await?;
    let version = db
        .value(&sql!("SELECT version()")?, &decode::<String>())
        .await?;
    db.close();
    Ok(version)
}
