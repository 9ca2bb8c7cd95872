//! Message cache backends.

mod sqlite;

pub use sqlite::SqliteCacheBackend;
