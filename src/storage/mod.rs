//! Storage layer.
//!
//! Two independent stores hold the data:
//! - **Cache**: fast transactional store for message verdicts and an expense
//!   replica (`SQLite`)
//! - **Export**: durable append-only expense file (CSV)
//!
//! Neither store is authoritative for expenses. Callers write to both and
//! report partial failures; see [`crate::services::DedupCoordinator`].

// Row counts fit comfortably in the float mantissa for rate calculations.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - holding the connection guard for the
// whole closure keeps each operation atomic.
#![allow(clippy::significant_drop_tightening)]

pub mod cache;
pub mod export;
pub mod metrics;
pub mod sqlite;
pub mod traits;

pub use cache::SqliteCacheBackend;
pub use export::CsvExportBackend;
pub use traits::{CacheBackend, ExpenseWrite, ExportBackend};
