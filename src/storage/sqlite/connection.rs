//! Shared connection handling for the `SQLite` cache backend.
//!
//! Provides mutex acquisition with poison recovery and the pragma set the
//! cache relies on for concurrent readers.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. The connection itself stays
/// usable; a half-finished transaction is rolled back by `SQLite`.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("storage mutex was poisoned, recovering");
            metrics::counter!("storage_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens a database file, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`Error::StoreUnavailable`] if the directory or database cannot
/// be created or opened.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::StoreUnavailable {
            store: "sqlite_cache".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }

    Connection::open(path).map_err(|e| Error::StoreUnavailable {
        store: "sqlite_cache".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

/// Configures a `SQLite` connection for the cache workload.
///
/// - **WAL mode**: concurrent readers alongside the single writer
/// - **NORMAL synchronous**: the cache is rebuildable, full fsync is not needed
/// - **`busy_timeout`**: wait for locks instead of failing with `SQLITE_BUSY`
///
/// # Errors
///
/// Currently infallible; pragma failures are ignored because in-memory
/// databases reject WAL.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so it cannot go through execute_batch
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS.to_string());

    Ok(())
}
