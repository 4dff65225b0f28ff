//! Composable parameterized SQL fragments, validated row decoding, and pooled
//! execution with flattened nested transactions.
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use sql_fragments::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct Run { id: i64, status: String }
//!
//! # async fn demo() -> Result<(), SqlFragmentsError> {
//! let db = Db::new_postgres(postgres_config_from_env()?).await?;
//! let runs = db
//!     .rows(&sql!("SELECT id, status FROM runs WHERE status = ", "queued")?, &decode::<Run>())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod db;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod prelude;
pub mod results;
pub mod sanitize;
pub mod shape;
pub mod statement_name;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use db::Db;
pub use driver::{Connection, ConnectionPool, DriverError};
pub use error::SqlFragmentsError;
pub use executor::{Handle, HandleState};
pub use fragment::{Arg, Fragment, Literal, ParsedStatement};
pub use results::{DbRow, ResultSet};
pub use shape::{Shape, ShapeError, ShapeIssue, decode, shape_fn};
pub use types::SqlValue;

#[cfg(feature = "postgres")]
pub use postgres::{PgConnection, PgPool, postgres_config_from_env};
