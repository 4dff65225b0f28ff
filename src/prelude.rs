//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::db::Db;
pub use crate::driver::{Connection, ConnectionPool, DriverError};
pub use crate::error::SqlFragmentsError;
pub use crate::executor::{Handle, HandleState};
pub use crate::fragment::{Arg, Fragment, Literal, ParsedStatement};
pub use crate::results::{DbRow, ResultSet};
pub use crate::shape::{Shape, ShapeError, ShapeIssue, decode, shape_fn};
pub use crate::types::SqlValue;
pub use crate::{sql, sql_lit};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgConnection, PgPool, postgres_config_from_env};

pub use futures_util::future::BoxFuture;
