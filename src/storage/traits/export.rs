//! Export backend trait.

use crate::Result;
use crate::models::{ExpenseRecord, ExportInfo, ExportStats};
use chrono::NaiveDate;

/// Trait for the durable, append-only expense sink.
///
/// Implementations are not required to support concurrent writers; the
/// write-behind worker serializes its appends.
pub trait ExportBackend: Send + Sync {
    /// Appends a record.
    fn append(&self, record: &ExpenseRecord) -> Result<()>;

    /// Returns aggregate statistics over all records.
    fn statistics(&self) -> Result<ExportStats>;

    /// Returns records whose date falls within `from..=to`.
    fn query_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ExpenseRecord>>;

    /// Returns records of a category (case-insensitive).
    fn query_by_category(&self, category: &str) -> Result<Vec<ExpenseRecord>>;

    /// Describes the store.
    fn info(&self) -> Result<ExportInfo>;

    /// Returns true if a record with the same content as `record` exists.
    ///
    /// Matches on [`ExpenseRecord::content_hash`], so a copy written under
    /// another ID counts.
    fn contains_expense(&self, record: &ExpenseRecord) -> Result<bool> {
        let day = record.date.date_naive();
        Ok(self
            .query_range(day, day)?
            .iter()
            .any(|existing| existing.same_content(record)))
    }
}
