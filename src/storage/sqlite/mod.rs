//! Shared `SQLite` infrastructure for the cache backend.
//!
//! - [`connection`]: mutex acquisition, opening and pragma configuration
//! - [`schema`]: table and index definitions plus the schema version marker
//! - [`row`]: conversions between rows and [`CacheEntry`](crate::models::CacheEntry)

mod connection;
mod row;
mod schema;

pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection, open_connection};
pub use row::{CacheEntryRow, decimal_from_sql, from_unix_seconds, to_unix_seconds};
pub use schema::{SCHEMA_VERSION, initialize_schema};
