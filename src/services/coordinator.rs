//! Dedup/cache coordinator.
//!
//! Decides whether an incoming message still needs evaluation, remembers
//! the verdict, and mirrors confirmed expenses into the cache store and the
//! export store.
//!
//! # Failure handling
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Cache lookup fails in `should_process` | `true` (fail-open) |
//! | Verdict write fails | `false`, logged |
//! | One store fails in `save_expense` | `false`, logged per combination, no rollback |
//! | Cache already holds the expense | export checked and filled in if missing |
//! | Stats source fails | that bundle degrades to its default, logged |

use crate::config::TallybookConfig;
use crate::gc::{CacheRetention, RetentionConfig};
use crate::models::{
    CacheEntry, CacheInfo, ExpenseRecord, ExportInfo, ExportStats, PerformanceStats,
    ProcessingStats, StorageInfo,
};
use crate::observability::component_span;
use crate::services::{MessageHasher, PatternClassifier, SystemMessageClassifier};
use crate::storage::sqlite::acquire_lock;
use crate::storage::{
    CacheBackend, CsvExportBackend, ExpenseWrite, ExportBackend, SqliteCacheBackend,
};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Span, debug, error, info, warn};

/// Verdict labels for `messages_evaluated_total`.
mod verdict {
    pub const SYSTEM: &str = "system";
    pub const DUPLICATE: &str = "duplicate";
    pub const NEW: &str = "new";
    pub const LOOKUP_FAILED: &str = "lookup_failed";
    pub const BLANK: &str = "blank";
}

fn record_verdict(label: &'static str) {
    metrics::counter!("messages_evaluated_total", "verdict" => label).increment(1);
}

fn record_write(outcome: &'static str) {
    metrics::counter!("expense_writes_total", "outcome" => outcome).increment(1);
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Dedup/cache coordinator.
///
/// Safe to share behind an `Arc`: the stores serialize their own access and
/// the hit/miss counters are atomics.
pub struct DedupCoordinator {
    cache: Arc<dyn CacheBackend>,
    export: Arc<dyn ExportBackend>,
    classifier: Arc<dyn SystemMessageClassifier>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Serializes export appends against export presence checks.
    export_lock: Mutex<()>,
    span: Span,
}

impl DedupCoordinator {
    /// Creates a coordinator over the given stores with the default
    /// classifier.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheBackend>, export: Arc<dyn ExportBackend>) -> Self {
        Self {
            cache,
            export,
            classifier: Arc::new(PatternClassifier::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            export_lock: Mutex::new(()),
            span: component_span("coordinator"),
        }
    }

    /// Opens the `SQLite` cache and the CSV export named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be opened.
    pub fn open(config: &TallybookConfig) -> Result<Self> {
        let export_path = config.resolved_export_path();
        let cache_path = config.resolved_cache_path();
        let cache = SqliteCacheBackend::new(&cache_path)?;
        let export = CsvExportBackend::new(&export_path)?;
        info!(
            cache = %cache_path.display(),
            export = %export_path.display(),
            "Opened expense stores"
        );
        Ok(Self::new(Arc::new(cache), Arc::new(export)))
    }

    /// Replaces the system-message classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SystemMessageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the span events are attributed to.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the span events are attributed to.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Decides whether a message still needs evaluation.
    ///
    /// System notices are cached as such and skipped. Otherwise the message
    /// is processed unless a verdict for its fingerprint already exists.
    /// Lookup failures answer `true` so no expense is silently lost.
    pub fn should_process(&self, text: &str, timestamp: DateTime<Utc>) -> bool {
        let _entered = self.span.enter();

        if text.trim().is_empty() {
            record_verdict(verdict::BLANK);
            debug!("Blank message, processing without caching");
            return true;
        }

        if self.classifier.is_system_message(text) {
            let fingerprint = MessageHasher::fingerprint(text, timestamp);
            if let Err(e) = self
                .cache
                .put(&CacheEntry::system(fingerprint.clone(), text, timestamp))
            {
                warn!(fingerprint = %fingerprint.short(), error = %e, "Failed to cache system message");
            }
            record_verdict(verdict::SYSTEM);
            debug!(fingerprint = %fingerprint.short(), "Skipping system message");
            return false;
        }

        let fingerprint = MessageHasher::fingerprint(text, timestamp);
        match self.cache.contains(&fingerprint) {
            Ok(true) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                record_verdict(verdict::DUPLICATE);
                debug!(fingerprint = %fingerprint.short(), "Message already processed");
                false
            },
            Ok(false) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                record_verdict(verdict::NEW);
                true
            },
            Err(e) => {
                record_verdict(verdict::LOOKUP_FAILED);
                warn!(
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Cache lookup failed, processing message anyway"
                );
                true
            },
        }
    }

    /// Records the verdict for an evaluated message.
    ///
    /// Returns `false` if the cache write fails. Calling it twice with the
    /// same arguments leaves one entry.
    pub fn cache_message_result(
        &self,
        text: &str,
        timestamp: DateTime<Utc>,
        expense: Option<&ExpenseRecord>,
    ) -> bool {
        let _entered = self.span.enter();
        let fingerprint = MessageHasher::fingerprint(text, timestamp);
        let entry = CacheEntry::evaluated(fingerprint, text, timestamp, expense);

        match self.cache.put(&entry) {
            Ok(()) => {
                debug!(
                    fingerprint = %entry.fingerprint.short(),
                    is_expense = entry.is_expense,
                    "Cached message verdict"
                );
                true
            },
            Err(e) => {
                error!(
                    fingerprint = %entry.fingerprint.short(),
                    error = %e,
                    "Failed to cache message verdict"
                );
                false
            },
        }
    }

    /// Writes an expense to both stores.
    ///
    /// Returns `true` only if the expense ends up in both stores. A partial
    /// write is not rolled back, so saving again is the way to recover.
    ///
    /// An expense the cache already holds (same amount, category,
    /// description and day) is appended to the export only if the export
    /// lacks it, which completes an earlier save whose export write failed.
    pub fn save_expense(&self, expense: &ExpenseRecord) -> bool {
        let _entered = self.span.enter();

        let cache_result = self.cache.store_expense(expense);
        if matches!(cache_result, Ok(ExpenseWrite::Duplicate)) {
            return self.complete_duplicate(expense);
        }
        let export_result = self.append_to_export(expense);

        match (cache_result, export_result) {
            (Ok(_), Ok(())) => {
                record_write("both");
                info!(expense.id = %expense.id, %expense, "Expense saved");
                true
            },
            (Err(cache_err), Err(export_err)) => {
                record_write("failed");
                error!(
                    expense.id = %expense.id,
                    %expense,
                    cache_error = %cache_err,
                    export_error = %export_err,
                    "Expense not saved: both stores failed"
                );
                false
            },
            (Ok(_), Err(export_err)) => {
                record_write("cache_only");
                error!(
                    expense.id = %expense.id,
                    %expense,
                    error = %export_err,
                    "Export write failed, expense only in cache"
                );
                false
            },
            (Err(cache_err), Ok(())) => {
                record_write("export_only");
                error!(
                    expense.id = %expense.id,
                    %expense,
                    error = %cache_err,
                    "Cache write failed, expense only in export"
                );
                false
            },
        }
    }

    fn complete_duplicate(&self, expense: &ExpenseRecord) -> bool {
        match self.export_if_missing(expense) {
            Ok(false) => {
                record_write("duplicate");
                debug!(expense.id = %expense.id, %expense, "Expense already in both stores");
                true
            },
            Ok(true) => {
                record_write("recovered");
                info!(
                    expense.id = %expense.id,
                    %expense,
                    "Cached expense was missing from export, appended"
                );
                true
            },
            Err(e) => {
                record_write("cache_only");
                error!(
                    expense.id = %expense.id,
                    %expense,
                    error = %e,
                    "Export write failed, expense only in cache"
                );
                false
            },
        }
    }

    /// Writes an expense to the cache store only.
    pub(crate) fn store_in_cache(&self, expense: &ExpenseRecord) -> Result<ExpenseWrite> {
        self.cache.store_expense(expense)
    }

    /// Appends an expense to the export store only.
    pub(crate) fn append_to_export(&self, expense: &ExpenseRecord) -> Result<()> {
        let _guard = acquire_lock(&self.export_lock);
        self.export.append(expense)
    }

    /// Appends an expense to the export store unless it already holds the
    /// same content.
    ///
    /// Returns `true` if a row was appended.
    pub(crate) fn export_if_missing(&self, expense: &ExpenseRecord) -> Result<bool> {
        let _guard = acquire_lock(&self.export_lock);
        if self.export.contains_expense(expense)? {
            return Ok(false);
        }
        self.export.append(expense)?;
        Ok(true)
    }

    /// Returns the latest known message timestamp.
    ///
    /// The cache answers first; the export's last record date is the
    /// fallback. Used to bound history re-scans on startup.
    pub fn last_processed_timestamp(&self) -> Option<DateTime<Utc>> {
        let _entered = self.span.enter();

        match self.cache.last_timestamp() {
            Ok(Some(ts)) => return Some(ts),
            Ok(None) => debug!("Cache empty, falling back to export"),
            Err(e) => warn!(error = %e, "Cache timestamp lookup failed, falling back to export"),
        }

        match self.export.statistics() {
            Ok(stats) => stats.last_record_date,
            Err(e) => {
                warn!(error = %e, "Export statistics unavailable");
                None
            },
        }
    }

    /// Returns combined cache, export and dedup statistics.
    pub fn processing_stats(&self) -> ProcessingStats {
        let _entered = self.span.enter();

        let cache = self.cache.aggregate_stats().unwrap_or_else(|e| {
            warn!(error = %e, "Cache statistics unavailable");
            crate::models::CacheStats::default()
        });
        let expenses = self.export_statistics_inner();

        let hits = self.hits.load(Ordering::Relaxed);
        let lookups = hits + self.misses.load(Ordering::Relaxed);
        let performance = PerformanceStats {
            cache_hit_rate: ratio(hits, lookups),
            system_filter_rate: ratio(cache.system_messages, cache.total_cached),
            lookups,
        };

        ProcessingStats {
            cache,
            expenses,
            performance,
        }
    }

    /// Removes verdicts for messages older than `days_to_keep` days.
    ///
    /// Cached and exported expenses are untouched. Returns the number of
    /// removed verdicts, 0 on failure.
    pub fn cleanup_cache(&self, days_to_keep: u32) -> usize {
        let _entered = self.span.enter();
        let retention = CacheRetention::new(
            Arc::clone(&self.cache),
            RetentionConfig::new().with_days(days_to_keep),
        );

        match retention.run(false) {
            Ok(result) => usize::try_from(result.entries_removed).unwrap_or(usize::MAX),
            Err(e) => {
                error!(error = %e, days_to_keep, "Cache cleanup failed");
                0
            },
        }
    }

    /// Returns the cached verdict for a message, if any.
    pub fn cached_message(&self, text: &str, timestamp: DateTime<Utc>) -> Option<CacheEntry> {
        let _entered = self.span.enter();
        let fingerprint = MessageHasher::fingerprint(text, timestamp);
        self.cache.get(&fingerprint).unwrap_or_else(|e| {
            warn!(fingerprint = %fingerprint.short(), error = %e, "Cache lookup failed");
            None
        })
    }

    /// Returns exported expenses dated within `from..=to`.
    pub fn expenses_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<ExpenseRecord> {
        let _entered = self.span.enter();
        self.export.query_range(from, to).unwrap_or_else(|e| {
            warn!(%from, %to, error = %e, "Expense range query failed");
            Vec::new()
        })
    }

    /// Returns exported expenses of a category (case-insensitive).
    pub fn expenses_by_category(&self, category: &str) -> Vec<ExpenseRecord> {
        let _entered = self.span.enter();
        self.export.query_by_category(category).unwrap_or_else(|e| {
            warn!(category, error = %e, "Expense category query failed");
            Vec::new()
        })
    }

    /// Returns export store aggregates.
    pub fn export_statistics(&self) -> ExportStats {
        let _entered = self.span.enter();
        self.export_statistics_inner()
    }

    fn export_statistics_inner(&self) -> ExportStats {
        self.export.statistics().unwrap_or_else(|e| {
            warn!(error = %e, "Export statistics unavailable");
            ExportStats::default()
        })
    }

    /// Describes both stores together with current statistics.
    pub fn storage_info(&self) -> StorageInfo {
        let stats = self.processing_stats();
        let _entered = self.span.enter();

        let cache = self.cache.info().unwrap_or_else(|e| {
            warn!(error = %e, "Cache info unavailable");
            CacheInfo::default()
        });
        let export = self.export.info().unwrap_or_else(|e| {
            warn!(error = %e, "Export info unavailable");
            ExportInfo::default()
        });

        StorageInfo {
            cache,
            export,
            stats,
        }
    }
}
