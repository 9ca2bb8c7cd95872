//! Cache database schema.

use crate::{Error, Result};
use rusqlite::{Connection, params};

/// Schema version written to the `metadata` table.
pub const SCHEMA_VERSION: &str = "1.0";

const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS processed_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    raw_text TEXT NOT NULL,
    message_timestamp INTEGER NOT NULL,
    is_system_message INTEGER NOT NULL DEFAULT 0,
    is_expense INTEGER NOT NULL DEFAULT 0,
    expense_amount TEXT,
    expense_category TEXT,
    cached_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    amount TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT,
    date INTEGER NOT NULL,
    expense_hash TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const CREATE_INDEXES: &str = r"
CREATE INDEX IF NOT EXISTS idx_processed_messages_timestamp
    ON processed_messages (message_timestamp);
CREATE INDEX IF NOT EXISTS idx_processed_messages_cached_at
    ON processed_messages (cached_at);
CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses (date);
CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses (category);
";

/// Creates tables and indexes if missing and records the schema version.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if any DDL statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)
        .map_err(|e| Error::operation("create_tables", e))?;
    conn.execute_batch(CREATE_INDEXES)
        .map_err(|e| Error::operation("create_indexes", e))?;
    conn.execute(
        "INSERT INTO metadata (key, value, updated_at)
         VALUES ('schema_version', ?1, strftime('%s', 'now'))
         ON CONFLICT(key) DO NOTHING",
        params![SCHEMA_VERSION],
    )
    .map_err(|e| Error::operation("write_schema_version", e))?;
    Ok(())
}
