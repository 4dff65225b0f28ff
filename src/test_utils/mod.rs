/// Test utilities for `PostgreSQL` testing and benchmarking
pub mod embedded;

pub use embedded::*;
