//! # Tallybook
//!
//! Message deduplication cache and hybrid expense persistence for
//! chat-driven expense tracking.
//!
//! Tallybook sits between a messaging client and the expense ledger. For
//! every incoming chat message it decides whether the message still needs
//! evaluation, remembers the verdict, and mirrors confirmed expenses into two
//! independent stores: a fast `SQLite` cache and a durable CSV export.
//!
//! ## Features
//!
//! - Fingerprint-based "process vs. skip" decisions with fail-open semantics
//! - System-message filtering (group notices, encryption banners, ...)
//! - High-water-mark timestamp for bounding history re-scans on startup
//! - Dual-write persistence with distinct partial-failure reporting
//! - Write-behind layer with a single background worker, bounded retries and
//!   a draining shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use tallybook::{DedupCoordinator, ExpenseRecord};
//!
//! let coordinator = DedupCoordinator::open(&config)?;
//! if coordinator.should_process(text, timestamp) {
//!     let expense = extract(text)?; // caller-provided extraction
//!     coordinator.cache_message_result(text, timestamp, expense.as_ref());
//!     if let Some(expense) = expense {
//!         coordinator.save_expense(&expense);
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod gc;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{LoggingConfig, TallybookConfig, WriteBehindConfig};
pub use models::{
    CacheEntry, CacheStats, ExpenseId, ExpenseRecord, ExportStats, MessageFingerprint,
    ProcessingStats, SyncStats,
};
pub use services::{
    DedupCoordinator, PatternClassifier, SystemMessageClassifier, WriteBehindStorage,
};
pub use storage::{CacheBackend, CsvExportBackend, ExportBackend, SqliteCacheBackend};

/// Error type for tallybook operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Expense validation fails, malformed dates or amounts |
/// | `OperationFailed` | A query, file write or schema step fails |
/// | `StoreUnavailable` | A store cannot be opened or reached at all |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - An expense amount is zero, negative or has more than two decimals
    /// - An expense category is blank
    /// - A stored row cannot be parsed back into a record
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - CSV rows cannot be written or read
    /// - Configuration files cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A store could not be opened or reached.
    #[error("store '{store}' unavailable: {cause}")]
    StoreUnavailable {
        /// The store that is unavailable.
        store: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for tallybook operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("amount must be positive".to_string());
        assert_eq!(err.to_string(), "invalid input: amount must be positive");

        let err = Error::operation("insert_expense", "disk full");
        assert_eq!(err.to_string(), "operation 'insert_expense' failed: disk full");

        let err = Error::StoreUnavailable {
            store: "csv_export".to_string(),
            cause: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store 'csv_export' unavailable: permission denied"
        );
    }
}
