//! Statistics bundles reported by the stores and services.
//!
//! These are monitoring signals. Nothing in the dedup or persistence paths
//! depends on their values.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Aggregate counters of the message cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total cached verdicts.
    pub total_cached: u64,
    /// Verdicts that produced an expense.
    pub expense_messages: u64,
    /// Verdicts for system notices.
    pub system_messages: u64,
    /// Verdicts that were neither expenses nor system notices.
    pub regular_messages: u64,
    /// Verdicts written per day over the last seven days.
    pub daily: BTreeMap<NaiveDate, u64>,
}

/// Totals for a single category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    /// Number of expenses.
    pub count: u64,
    /// Sum of amounts.
    pub amount: Decimal,
}

/// Aggregates of the export store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Number of exported expenses.
    pub total_expenses: u64,
    /// Sum of all amounts.
    pub total_amount: Decimal,
    /// Per-category totals.
    pub categories: BTreeMap<String, CategoryTotals>,
    /// Date of the earliest expense.
    pub first_record_date: Option<DateTime<Utc>>,
    /// Date of the latest expense.
    pub last_record_date: Option<DateTime<Utc>>,
}

/// Derived dedup performance figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Share of cache lookups that found an existing verdict.
    pub cache_hit_rate: f64,
    /// Share of cached verdicts that are system notices.
    pub system_filter_rate: f64,
    /// Number of cache lookups performed by this coordinator.
    pub lookups: u64,
}

/// Combined processing statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Message cache counters.
    pub cache: CacheStats,
    /// Export store aggregates.
    pub expenses: ExportStats,
    /// Derived figures.
    pub performance: PerformanceStats,
}

/// Counters of the write-behind layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Jobs written to the export store.
    pub synced: u64,
    /// Jobs dropped after exhausting their attempts.
    pub failed: u64,
    /// Failed attempts that were re-enqueued.
    pub retried: u64,
    /// Jobs queued or in flight.
    pub pending: u64,
    /// Jobs still queued when the worker was stopped.
    pub abandoned: u64,
    /// Whether the worker thread is running.
    pub worker_active: bool,
}

/// Cache store description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Database path (`None` for in-memory).
    pub path: Option<PathBuf>,
    /// Schema version recorded in the metadata table.
    pub schema_version: Option<String>,
    /// Number of cached verdicts.
    pub entries: u64,
    /// Number of cached expenses.
    pub expenses: u64,
}

/// Export store description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    /// Export file path.
    pub path: PathBuf,
    /// Whether the file exists yet.
    pub exists: bool,
    /// Number of data rows.
    pub rows: u64,
}

/// Combined description of both stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Cache store.
    pub cache: CacheInfo,
    /// Export store.
    pub export: ExportInfo,
    /// Processing statistics at the time of the call.
    pub stats: ProcessingStats,
}
