//! Garbage collection for the message cache.
//!
//! Cached verdicts only need to outlive the window in which a messaging
//! client may re-deliver a message. The retention collector removes
//! verdicts whose message timestamp is older than the retention period.
//! Expenses are never collected.
//!
//! # Example
//!
//! ```rust,ignore
//! use tallybook::gc::{CacheRetention, RetentionConfig};
//! use tallybook::SqliteCacheBackend;
//! use std::sync::Arc;
//!
//! let cache = Arc::new(SqliteCacheBackend::new("gastos.cache.db")?);
//! let gc = CacheRetention::new(cache, RetentionConfig::from_env());
//!
//! // Dry run to see what would be removed
//! let result = gc.run(true)?;
//! println!("{}", result.summary());
//! ```

mod retention;

pub use retention::{
    CacheRetention, DEFAULT_RETENTION_DAYS, RETENTION_DAYS_ENV, RetentionConfig,
    RetentionGcResult, retention_days,
};
