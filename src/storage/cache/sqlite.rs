//! `SQLite`-based message cache.
//!
//! Holds one verdict per message fingerprint plus the cache-side replica of
//! confirmed expenses. Verdicts are pruned by retention; expenses are kept.

use crate::models::{CacheEntry, CacheInfo, CacheStats, ExpenseRecord, MessageFingerprint};
use crate::storage::metrics::observe;
use crate::storage::sqlite::{
    CacheEntryRow, acquire_lock, configure_connection, from_unix_seconds,
    initialize_schema, open_connection, to_unix_seconds,
};
use crate::storage::traits::{CacheBackend, ExpenseWrite};
use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite_cache";

/// Number of days covered by [`CacheStats::daily`].
pub const DAILY_STATS_DAYS: i64 = 7;

/// `SQLite`-based message cache.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
/// WAL mode and `busy_timeout` let a second process read the same file while
/// this one writes.
pub struct SqliteCacheBackend {
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteCacheBackend {
    /// Opens (or creates) a cache database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the file cannot be opened, or
    /// [`Error::OperationFailed`] if the schema cannot be created.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Creates an in-memory cache (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::StoreUnavailable {
            store: BACKEND.to_string(),
            cause: e.to_string(),
        })?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        initialize_schema(&conn)
    }

    fn count(conn: &Connection, sql: &str, operation: &str) -> Result<u64> {
        let n: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| Error::operation(operation, e))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn daily_counts(conn: &Connection, since: DateTime<Utc>) -> Result<BTreeMap<NaiveDate, u64>> {
        let mut stmt = conn
            .prepare(
                "SELECT date(cached_at, 'unixepoch') AS day, COUNT(*)
                 FROM processed_messages
                 WHERE cached_at >= ?1
                 GROUP BY day
                 ORDER BY day",
            )
            .map_err(|e| Error::operation("prepare_daily_stats", e))?;

        let rows = stmt
            .query_map(params![to_unix_seconds(since)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::operation("query_daily_stats", e))?;

        let mut daily = BTreeMap::new();
        for row in rows {
            let (day, n) = row.map_err(|e| Error::operation("read_daily_stats", e))?;
            let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| Error::InvalidInput(format!("day '{day}': {e}")))?;
            daily.insert(day, u64::try_from(n).unwrap_or(0));
        }
        Ok(daily)
    }
}

impl CacheBackend for SqliteCacheBackend {
    #[instrument(skip(self), fields(operation = "get", backend = BACKEND, fingerprint = %fingerprint.short()))]
    fn get(&self, fingerprint: &MessageFingerprint) -> Result<Option<CacheEntry>> {
        let start = Instant::now();
        let result = (|| -> Result<Option<CacheEntry>> {
            let conn = acquire_lock(&self.conn);
            let sql = format!(
                "SELECT {} FROM processed_messages WHERE fingerprint = ?1",
                CacheEntryRow::COLUMNS
            );
            let row = conn
                .query_row(&sql, params![fingerprint.as_str()], CacheEntryRow::from_row)
                .optional()
                .map_err(|e| Error::operation("get_cache_entry", e))?;
            row.map(CacheEntryRow::into_entry).transpose()
        })();
        observe(BACKEND, "get", start, result)
    }

    #[instrument(skip(self, entry), fields(operation = "put", backend = BACKEND, fingerprint = %entry.fingerprint.short()))]
    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let start = Instant::now();
        let result = (|| -> Result<()> {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO processed_messages
                    (fingerprint, raw_text, message_timestamp, is_system_message,
                     is_expense, expense_amount, expense_category, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                    raw_text = excluded.raw_text,
                    message_timestamp = excluded.message_timestamp,
                    is_system_message = excluded.is_system_message,
                    is_expense = excluded.is_expense,
                    expense_amount = excluded.expense_amount,
                    expense_category = excluded.expense_category,
                    cached_at = excluded.cached_at",
                params![
                    entry.fingerprint.as_str(),
                    entry.raw_text,
                    to_unix_seconds(entry.timestamp),
                    entry.is_system_message,
                    entry.is_expense,
                    entry.expense_amount.map(|a| a.to_string()),
                    entry.expense_category,
                    to_unix_seconds(entry.cached_at),
                ],
            )
            .map_err(|e| Error::operation("put_cache_entry", e))?;
            Ok(())
        })();
        observe(BACKEND, "put", start, result)
    }

    #[instrument(skip(self), fields(operation = "last_timestamp", backend = BACKEND))]
    fn last_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let start = Instant::now();
        let result = (|| -> Result<Option<DateTime<Utc>>> {
            let conn = acquire_lock(&self.conn);
            let secs: Option<i64> = conn
                .query_row(
                    "SELECT MAX(message_timestamp) FROM processed_messages",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| Error::operation("last_timestamp", e))?;
            secs.map(from_unix_seconds).transpose()
        })();
        observe(BACKEND, "last_timestamp", start, result)
    }

    #[instrument(skip(self), fields(operation = "aggregate_stats", backend = BACKEND))]
    fn aggregate_stats(&self) -> Result<CacheStats> {
        let start = Instant::now();
        let result = (|| -> Result<CacheStats> {
            let conn = acquire_lock(&self.conn);
            let total_cached =
                Self::count(&conn, "SELECT COUNT(*) FROM processed_messages", "count_cached")?;
            let expense_messages = Self::count(
                &conn,
                "SELECT COUNT(*) FROM processed_messages WHERE is_expense = 1",
                "count_expense_messages",
            )?;
            let system_messages = Self::count(
                &conn,
                "SELECT COUNT(*) FROM processed_messages WHERE is_system_message = 1",
                "count_system_messages",
            )?;
            let daily = Self::daily_counts(&conn, Utc::now() - Duration::days(DAILY_STATS_DAYS))?;

            Ok(CacheStats {
                total_cached,
                expense_messages,
                system_messages,
                regular_messages: total_cached.saturating_sub(expense_messages + system_messages),
                daily,
            })
        })();
        observe(BACKEND, "aggregate_stats", start, result)
    }

    #[instrument(skip(self), fields(operation = "delete_older_than", backend = BACKEND, cutoff = %cutoff))]
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let start = Instant::now();
        let result = (|| -> Result<usize> {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "DELETE FROM processed_messages WHERE message_timestamp < ?1",
                params![to_unix_seconds(cutoff)],
            )
            .map_err(|e| Error::operation("delete_old_cache_entries", e))
        })();
        observe(BACKEND, "delete_older_than", start, result)
    }

    fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM processed_messages WHERE message_timestamp < ?1",
                params![to_unix_seconds(cutoff)],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("count_old_cache_entries", e))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    #[instrument(skip(self, record), fields(operation = "store_expense", backend = BACKEND, expense.id = %record.id))]
    fn store_expense(&self, record: &ExpenseRecord) -> Result<ExpenseWrite> {
        let start = Instant::now();
        let result = (|| -> Result<ExpenseWrite> {
            let conn = acquire_lock(&self.conn);
            // OR IGNORE covers both the id and the expense_hash constraints
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO expenses
                        (id, amount, category, description, date, expense_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.id.as_str(),
                        record.amount.to_string(),
                        record.category,
                        record.description,
                        to_unix_seconds(record.date),
                        record.content_hash(),
                        to_unix_seconds(Utc::now()),
                    ],
                )
                .map_err(|e| Error::operation("store_expense", e))?;

            Ok(if inserted == 0 {
                ExpenseWrite::Duplicate
            } else {
                ExpenseWrite::Inserted
            })
        })();
        observe(BACKEND, "store_expense", start, result)
    }

    fn expense_count(&self) -> Result<u64> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            Self::count(&conn, "SELECT COUNT(*) FROM expenses", "count_expenses")
        };
        observe(BACKEND, "expense_count", start, result)
    }

    fn info(&self) -> Result<CacheInfo> {
        let conn = acquire_lock(&self.conn);
        let schema_version: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::operation("read_schema_version", e))?;

        Ok(CacheInfo {
            path: self.db_path.clone(),
            schema_version,
            entries: Self::count(&conn, "SELECT COUNT(*) FROM processed_messages", "count_cached")?,
            expenses: Self::count(&conn, "SELECT COUNT(*) FROM expenses", "count_expenses")?,
        })
    }

    fn contains(&self, fingerprint: &MessageFingerprint) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT 1 FROM processed_messages WHERE fingerprint = ?1",
            params![fingerprint.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(|e| Error::operation("contains_cache_entry", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SCHEMA_VERSION;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn entry(hash: &str, at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::evaluated(MessageFingerprint::from_hash(hash), "hola", at, None)
    }

    #[test]
    fn test_put_and_get() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        let expense = ExpenseRecord::new(Decimal::new(1250, 2), "super", None, ts(14, 9)).unwrap();
        let cached = CacheEntry::evaluated(
            MessageFingerprint::from_hash("fp1"),
            "12.50 super",
            ts(14, 9),
            Some(&expense),
        )
        .with_cached_at(ts(14, 10));

        backend.put(&cached).unwrap();
        let loaded = backend.get(&cached.fingerprint).unwrap().unwrap();

        assert_eq!(loaded, cached);
        assert!(backend.contains(&cached.fingerprint).unwrap());
        assert!(backend.get(&MessageFingerprint::from_hash("nope")).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing_verdict() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        backend.put(&entry("fp", ts(14, 9))).unwrap();
        backend
            .put(&CacheEntry::system(MessageFingerprint::from_hash("fp"), "hola", ts(14, 9)))
            .unwrap();

        let loaded = backend.get(&MessageFingerprint::from_hash("fp")).unwrap().unwrap();
        assert!(loaded.is_system_message);
        assert_eq!(backend.info().unwrap().entries, 1);
    }

    #[test]
    fn test_last_timestamp() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        assert!(backend.last_timestamp().unwrap().is_none());

        backend.put(&entry("a", ts(14, 9))).unwrap();
        backend.put(&entry("b", ts(16, 9))).unwrap();
        backend.put(&entry("c", ts(15, 9))).unwrap();

        assert_eq!(backend.last_timestamp().unwrap(), Some(ts(16, 9)));
    }

    #[test]
    fn test_delete_older_than_uses_message_timestamp() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        backend.put(&entry("old", ts(1, 9))).unwrap();
        backend.put(&entry("new", ts(20, 9))).unwrap();

        assert_eq!(backend.count_older_than(ts(10, 0)).unwrap(), 1);
        let deleted = backend.delete_older_than(ts(10, 0)).unwrap();

        assert_eq!(deleted, 1);
        assert!(!backend.contains(&MessageFingerprint::from_hash("old")).unwrap());
        assert!(backend.contains(&MessageFingerprint::from_hash("new")).unwrap());
    }

    #[test]
    fn test_store_expense_detects_duplicates() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        let first = ExpenseRecord::new(Decimal::from(250), "carniceria", None, ts(14, 9)).unwrap();
        let same_day = ExpenseRecord::new(Decimal::from(250), "carniceria", None, ts(14, 20)).unwrap();
        let next_day = ExpenseRecord::new(Decimal::from(250), "carniceria", None, ts(15, 9)).unwrap();

        assert_eq!(backend.store_expense(&first).unwrap(), ExpenseWrite::Inserted);
        assert_eq!(backend.store_expense(&first).unwrap(), ExpenseWrite::Duplicate);
        assert_eq!(backend.store_expense(&same_day).unwrap(), ExpenseWrite::Duplicate);
        assert_eq!(backend.store_expense(&next_day).unwrap(), ExpenseWrite::Inserted);
        assert_eq!(backend.expense_count().unwrap(), 2);
    }

    #[test]
    fn test_aggregate_stats() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        let now = Utc::now();
        let expense = ExpenseRecord::new(Decimal::from(10), "cafe", None, now).unwrap();

        backend
            .put(&CacheEntry::evaluated(
                MessageFingerprint::from_hash("e"),
                "10 cafe",
                now,
                Some(&expense),
            ))
            .unwrap();
        backend
            .put(&CacheEntry::system(MessageFingerprint::from_hash("s"), "notice", now))
            .unwrap();
        backend.put(&entry("r", now)).unwrap();
        backend
            .put(&entry("stale", now).with_cached_at(now - Duration::days(30)))
            .unwrap();

        let stats = backend.aggregate_stats().unwrap();
        assert_eq!(stats.total_cached, 4);
        assert_eq!(stats.expense_messages, 1);
        assert_eq!(stats.system_messages, 1);
        assert_eq!(stats.regular_messages, 2);
        assert_eq!(stats.daily.values().sum::<u64>(), 3);
    }

    #[test]
    fn test_file_backed_info_and_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gastos.cache.db");
        {
            let backend = SqliteCacheBackend::new(&path).unwrap();
            backend.put(&entry("fp", ts(14, 9))).unwrap();
        }

        let backend = SqliteCacheBackend::new(&path).unwrap();
        let info = backend.info().unwrap();
        assert_eq!(info.path.as_deref(), Some(path.as_path()));
        assert_eq!(info.schema_version.as_deref(), Some(SCHEMA_VERSION));
        assert_eq!(info.entries, 1);
        assert_eq!(info.expenses, 0);
    }
}
