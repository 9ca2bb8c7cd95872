//! Age-based retention for cached message verdicts.

use crate::Result;
use crate::storage::CacheBackend;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Environment variable for the retention period in days.
pub const RETENTION_DAYS_ENV: &str = "TALLYBOOK_RETENTION_DAYS";

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts a count to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn count_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Returns the configured retention period in days.
///
/// Reads from `TALLYBOOK_RETENTION_DAYS`, defaulting to 30.
#[must_use]
pub fn retention_days() -> u32 {
    std::env::var(RETENTION_DAYS_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

/// Retention policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Retention period in days.
    pub days: u32,

    /// Floor applied to `days`.
    ///
    /// Zero allows a sweep of everything older than now.
    pub minimum_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
            minimum_days: 0,
        }
    }
}

impl RetentionConfig {
    /// Creates a retention config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a retention config from environment variables.
    ///
    /// Reads:
    /// - `TALLYBOOK_RETENTION_DAYS`: retention period
    /// - `TALLYBOOK_RETENTION_MIN_DAYS`: floor for the retention period
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default().with_days(retention_days());
        if let Some(d) = std::env::var("TALLYBOOK_RETENTION_MIN_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.minimum_days = d;
        }
        config
    }

    /// Sets the retention period.
    #[must_use]
    pub const fn with_days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    /// Sets the retention floor.
    #[must_use]
    pub const fn with_minimum_days(mut self, days: u32) -> Self {
        self.minimum_days = days;
        self
    }

    /// Returns the retention period after applying the floor.
    #[must_use]
    pub fn effective_days(&self) -> u32 {
        self.days.max(self.minimum_days)
    }

    /// Returns the cutoff relative to `now`.
    ///
    /// Verdicts with a message timestamp before the cutoff are expired.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(TimeDelta::days(i64::from(self.effective_days())))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Result of a retention run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionGcResult {
    /// Number of verdicts removed (or that would be removed).
    pub entries_removed: u64,

    /// Cutoff used for the run.
    pub cutoff: DateTime<Utc>,

    /// Whether this was a dry run.
    pub dry_run: bool,

    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl RetentionGcResult {
    /// Returns `true` if any verdict expired.
    #[must_use]
    pub const fn has_expired_entries(&self) -> bool {
        self.entries_removed > 0
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let action = if self.dry_run { "would remove" } else { "removed" };
        if self.entries_removed == 0 {
            format!(
                "No cached messages older than {} ({}ms)",
                self.cutoff.format("%Y-%m-%d %H:%M"),
                self.duration_ms
            )
        } else {
            format!(
                "{action} {} cached messages older than {} in {}ms",
                self.entries_removed,
                self.cutoff.format("%Y-%m-%d %H:%M"),
                self.duration_ms
            )
        }
    }
}

/// Retention collector for the message cache.
pub struct CacheRetention {
    cache: Arc<dyn CacheBackend>,
    config: RetentionConfig,
}

impl CacheRetention {
    /// Creates a new retention collector.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheBackend>, config: RetentionConfig) -> Self {
        Self { cache, config }
    }

    /// Removes verdicts older than the retention period.
    ///
    /// With `dry_run` set, only counts them.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    #[instrument(
        name = "tallybook.gc.retention",
        skip(self),
        fields(component = "gc", retention_days = self.config.effective_days())
    )]
    pub fn run(&self, dry_run: bool) -> Result<RetentionGcResult> {
        self.run_at(Utc::now(), dry_run)
    }

    /// Same as [`CacheRetention::run`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    pub fn run_at(&self, now: DateTime<Utc>, dry_run: bool) -> Result<RetentionGcResult> {
        let start = Instant::now();
        let cutoff = self.config.cutoff(now);
        debug!(%cutoff, "Sweeping cached messages");

        let entries_removed = if dry_run {
            self.cache.count_older_than(cutoff)?
        } else {
            u64::try_from(self.cache.delete_older_than(cutoff)?).unwrap_or(u64::MAX)
        };

        let result = RetentionGcResult {
            entries_removed,
            cutoff,
            dry_run,
            duration_ms: duration_to_millis(start.elapsed()),
        };

        metrics::counter!(
            "gc_retention_runs_total",
            "dry_run" => dry_run.to_string()
        )
        .increment(1);
        metrics::gauge!("gc_retention_removed").set(count_to_f64(entries_removed));
        metrics::histogram!("gc_retention_duration_ms").record(count_to_f64(result.duration_ms));

        info!(
            entries_removed,
            duration_ms = result.duration_ms,
            dry_run,
            "Retention GC completed"
        );

        Ok(result)
    }

    /// Returns the retention configuration.
    #[must_use]
    pub const fn config(&self) -> &RetentionConfig {
        &self.config
    }
}
