//! Untyped driver output, before shape decoding.

mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::DbRow;
