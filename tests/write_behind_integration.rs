//! Write-behind integration tests.
//!
//! Drives the background worker against a real cache store and an export
//! store that can be made to fail or stall.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tallybook::models::{ExportInfo, ExportStats};
use tallybook::{
    CsvExportBackend, DedupCoordinator, Error, ExpenseRecord, ExportBackend, Result,
    SqliteCacheBackend, WriteBehindConfig, WriteBehindStorage,
};
use tempfile::TempDir;

/// Export store that fails a set number of appends and can stall each one.
struct FlakyExport {
    inner: CsvExportBackend,
    failures_left: AtomicU32,
    delay_ms: AtomicU64,
    attempts: AtomicU32,
}

impl FlakyExport {
    fn new(dir: &TempDir, failures: u32) -> Self {
        Self {
            inner: CsvExportBackend::new(dir.path().join("gastos.csv")).unwrap(),
            failures_left: AtomicU32::new(failures),
            delay_ms: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    fn with_delay(self, delay: Duration) -> Self {
        self.delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
        self
    }
}

impl ExportBackend for FlakyExport {
    fn append(&self, record: &ExpenseRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::StoreUnavailable {
                store: "flaky_export".to_string(),
                cause: "disk full".to_string(),
            });
        }
        self.inner.append(record)
    }

    fn statistics(&self) -> Result<ExportStats> {
        self.inner.statistics()
    }

    fn query_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ExpenseRecord>> {
        self.inner.query_range(from, to)
    }

    fn query_by_category(&self, category: &str) -> Result<Vec<ExpenseRecord>> {
        self.inner.query_by_category(category)
    }

    fn info(&self) -> Result<ExportInfo> {
        self.inner.info()
    }
}

fn fast_config() -> WriteBehindConfig {
    WriteBehindConfig::new()
        .with_poll_interval(Duration::from_millis(20))
        .with_drain_poll_interval(Duration::from_millis(10))
}

fn storage(export: Arc<FlakyExport>) -> WriteBehindStorage {
    let cache = Arc::new(SqliteCacheBackend::in_memory().unwrap());
    let coordinator = Arc::new(DedupCoordinator::new(cache, export));
    WriteBehindStorage::new(coordinator, fast_config()).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, h, m, 0).unwrap()
}

fn expense(amount: i64, category: &str, ts: DateTime<Utc>) -> ExpenseRecord {
    ExpenseRecord::new(Decimal::from(amount), category, None, ts).unwrap()
}

#[test]
fn test_async_save_is_exported_after_sync() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));
    let storage = storage(Arc::clone(&export));

    assert!(storage.save_expense_async(&expense(500, "pizza", at(18, 12))));
    assert_eq!(storage.sync_pending_writes(Duration::from_secs(30)), 1);

    let stats = export.statistics().unwrap();
    assert_eq!(stats.total_expenses, 1);
    assert_eq!(stats.total_amount, Decimal::from(500));

    let sync = storage.sync_stats();
    assert_eq!(sync.synced, 1);
    assert_eq!(sync.pending, 0);
    assert!(sync.worker_active);
    assert_eq!(
        storage.coordinator().storage_info().cache.expenses,
        1,
        "cache write happens on the caller thread"
    );
}

#[test]
fn test_retry_ceiling_drops_job() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, u32::MAX));
    let storage = storage(Arc::clone(&export));

    assert!(storage.save_expense_async(&expense(250, "carniceria", at(14, 44))));
    assert_eq!(storage.sync_pending_writes(Duration::from_secs(30)), 1);

    let sync = storage.sync_stats();
    assert_eq!(sync.failed, 1);
    assert_eq!(sync.retried, 2);
    assert_eq!(sync.synced, 0);
    assert_eq!(sync.pending, 0);
    assert_eq!(export.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(export.statistics().unwrap().total_expenses, 0);
}

#[test]
fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 2));
    let storage = storage(Arc::clone(&export));

    assert!(storage.save_expense_async(&expense(90, "super", at(10, 5))));
    storage.sync_pending_writes(Duration::from_secs(30));

    let sync = storage.sync_stats();
    assert_eq!(sync.synced, 1);
    assert_eq!(sync.retried, 2);
    assert_eq!(sync.failed, 0);
    assert_eq!(export.statistics().unwrap().total_expenses, 1);
}

#[test]
fn test_custom_attempt_limit() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, u32::MAX));
    let cache = Arc::new(SqliteCacheBackend::in_memory().unwrap());
    let coordinator = Arc::new(DedupCoordinator::new(cache, export.clone()));
    let storage =
        WriteBehindStorage::new(coordinator, fast_config().with_max_attempts(1)).unwrap();

    storage.save_expense_async(&expense(12, "cafe", at(8, 0)));
    storage.sync_pending_writes(Duration::from_secs(30));

    let sync = storage.sync_stats();
    assert_eq!(sync.failed, 1);
    assert_eq!(sync.retried, 0);
    assert_eq!(export.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_duplicate_expense_is_exported_once() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));
    let storage = storage(Arc::clone(&export));
    let first = expense(500, "pizza", at(18, 12));
    let again = expense(500, "pizza", at(18, 40));

    assert!(storage.save_expense_async(&first));
    assert!(storage.save_expense_async(&again));
    storage.sync_pending_writes(Duration::from_secs(30));

    assert_eq!(storage.sync_stats().synced, 2);
    assert_eq!(export.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(export.statistics().unwrap().total_expenses, 1);
}

#[test]
fn test_dropped_export_is_completed_by_a_later_save() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 1));
    let cache = Arc::new(SqliteCacheBackend::in_memory().unwrap());
    let coordinator = Arc::new(DedupCoordinator::new(cache, export.clone()));
    let storage =
        WriteBehindStorage::new(coordinator, fast_config().with_max_attempts(1)).unwrap();
    let record = expense(250, "carniceria", at(14, 44));

    assert!(storage.save_expense_async(&record));
    storage.sync_pending_writes(Duration::from_secs(30));
    assert_eq!(storage.sync_stats().failed, 1);
    assert_eq!(export.statistics().unwrap().total_expenses, 0);

    assert!(storage.save_expense_async(&record));
    storage.sync_pending_writes(Duration::from_secs(30));
    assert_eq!(export.statistics().unwrap().total_expenses, 1);

    assert!(storage.save_expense_async(&record));
    assert!(storage.coordinator().save_expense(&record));
    storage.sync_pending_writes(Duration::from_secs(30));
    assert_eq!(export.statistics().unwrap().total_expenses, 1);
    assert_eq!(export.attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_async_save_returns_before_slow_export() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0).with_delay(Duration::from_millis(500)));
    let storage = storage(Arc::clone(&export));

    let start = Instant::now();
    assert!(storage.save_expense_async(&expense(500, "pizza", at(18, 12))));
    let elapsed = start.elapsed();
    assert!(
        elapsed < Duration::from_millis(250),
        "save waited on the export: {elapsed:?}"
    );
    assert_eq!(
        storage.coordinator().storage_info().cache.expenses,
        1,
        "cache write happens before returning"
    );

    assert_eq!(storage.sync_pending_writes(Duration::from_secs(30)), 1);
    assert_eq!(export.statistics().unwrap().total_expenses, 1);
}

#[test]
fn test_shutdown_drains_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));
    let storage = storage(Arc::clone(&export));

    for (i, category) in ["pizza", "super", "cafe"].iter().enumerate() {
        let amount = i64::try_from(i + 1).unwrap() * 100;
        assert!(storage.save_expense_async(&expense(amount, category, at(12, 0))));
    }

    let first = storage.shutdown(Duration::from_secs(30));
    assert_eq!(first.synced, 3);
    assert_eq!(first.pending, 0);
    assert_eq!(first.abandoned, 0);
    assert!(!first.worker_active);

    let second = storage.shutdown(Duration::from_secs(30));
    assert_eq!(second, first);
    assert_eq!(export.statistics().unwrap().total_expenses, 3);
}

#[test]
fn test_shutdown_without_wait_abandons_queued_jobs() {
    let dir = TempDir::new().unwrap();
    let export =
        Arc::new(FlakyExport::new(&dir, 0).with_delay(Duration::from_millis(200)));
    let storage = storage(Arc::clone(&export));

    for (i, category) in ["pizza", "super", "cafe", "taxi"].iter().enumerate() {
        let amount = i64::try_from(i + 1).unwrap() * 10;
        assert!(storage.save_expense_async(&expense(amount, category, at(12, 0))));
    }

    let stats = storage.shutdown(Duration::ZERO);

    assert!(stats.abandoned >= 1, "expected abandoned jobs, got {stats:?}");
    assert_eq!(stats.synced + stats.abandoned, 4);
    assert_eq!(stats.pending, 0);
    assert!(!stats.worker_active);
}

#[test]
fn test_save_after_shutdown_falls_back_to_synchronous() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));
    let storage = storage(Arc::clone(&export));

    storage.shutdown(Duration::from_secs(5));
    assert!(storage.save_expense_async(&expense(75, "farmacia", at(19, 30))));

    assert_eq!(export.statistics().unwrap().total_expenses, 1);
    assert_eq!(storage.sync_stats().synced, 0);
}

#[test]
fn test_saves_racing_shutdown_are_exported_or_abandoned() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));
    let storage = Arc::new(storage(Arc::clone(&export)));

    let savers: Vec<_> = (0..4_i64)
        .map(|t| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                (1..=25_i64)
                    .map(|i| storage.save_expense_async(&expense(t * 100 + i, "cafe", at(9, 0))))
                    .filter(|saved| *saved)
                    .count()
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(5));
    let stats = storage.shutdown(Duration::ZERO);
    let saved: usize = savers.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(saved, 100);
    let exported = export.statistics().unwrap().total_expenses;
    let final_stats = storage.sync_stats();
    assert_eq!(final_stats.pending, 0);
    assert_eq!(final_stats, stats);
    assert_eq!(exported + stats.abandoned, 100, "stats: {stats:?}");
}

#[test]
fn test_drop_stops_worker() {
    let dir = TempDir::new().unwrap();
    let export = Arc::new(FlakyExport::new(&dir, 0));

    {
        let storage = storage(Arc::clone(&export));
        storage.save_expense_async(&expense(40, "cafe", at(7, 30)));
        storage.sync_pending_writes(Duration::from_secs(30));
    }

    // The worker held the last other reference to the export store
    assert_eq!(Arc::strong_count(&export), 1);
}
