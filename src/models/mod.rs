//! Data models for tallybook.
//!
//! This module contains the core data structures shared by the stores, the
//! coordinator and the write-behind layer.

mod expense;
mod message;
mod stats;

pub use expense::{ExpenseId, ExpenseRecord, MAX_AMOUNT_SCALE, normalize_category};
pub use message::{CacheEntry, MessageFingerprint};
pub use stats::{
    CacheInfo, CacheStats, CategoryTotals, ExportInfo, ExportStats, PerformanceStats,
    ProcessingStats, StorageInfo, SyncStats,
};
