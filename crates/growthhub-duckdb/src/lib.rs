pub mod backend;
pub mod schema;
pub mod usage_log;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so tests can use
/// `growthhub_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
