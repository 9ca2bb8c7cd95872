//! Message cache backend trait.

use crate::Result;
use crate::models::{CacheEntry, CacheInfo, CacheStats, ExpenseRecord, MessageFingerprint};
use chrono::{DateTime, Utc};

/// Outcome of writing an expense to the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseWrite {
    /// The expense was stored.
    Inserted,
    /// An equivalent expense (same amount, category, description and day)
    /// already exists; nothing was written.
    Duplicate,
}

/// Trait for the fast transactional store.
///
/// Holds per-fingerprint message verdicts and the cache-side replica of
/// confirmed expenses. Implementations must be safe for concurrent use from
/// the caller thread and stats readers.
pub trait CacheBackend: Send + Sync {
    /// Looks up the verdict for a fingerprint.
    fn get(&self, fingerprint: &MessageFingerprint) -> Result<Option<CacheEntry>>;

    /// Inserts or replaces the verdict for `entry.fingerprint`.
    fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Returns the most recent message timestamp among cached verdicts.
    fn last_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Returns aggregate verdict counters.
    fn aggregate_stats(&self) -> Result<CacheStats>;

    /// Deletes verdicts whose message timestamp is older than `cutoff`.
    ///
    /// Returns the number of deleted verdicts. Cached expenses are untouched.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Counts verdicts that [`CacheBackend::delete_older_than`] would delete.
    fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Stores the cache-side replica of an expense.
    fn store_expense(&self, record: &ExpenseRecord) -> Result<ExpenseWrite>;

    /// Returns the number of cached expenses.
    fn expense_count(&self) -> Result<u64>;

    /// Describes the store.
    fn info(&self) -> Result<CacheInfo>;

    /// Checks if a verdict exists for a fingerprint.
    fn contains(&self, fingerprint: &MessageFingerprint) -> Result<bool> {
        Ok(self.get(fingerprint)?.is_some())
    }
}
