//! Write-behind tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of export attempts per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default worker wait for new jobs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default drain budget used by shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between drain progress checks.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration of the write-behind worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBehindConfig {
    /// Total export attempts before a job is dropped.
    pub max_attempts: u32,
    /// How long the worker waits on an empty queue before re-checking for stop.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Default drain budget for shutdown.
    #[serde(with = "millis")]
    pub drain_timeout: Duration,
    /// Interval between drain progress checks.
    #[serde(with = "millis")]
    pub drain_poll_interval: Duration,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
        }
    }
}

impl WriteBehindConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from environment variables.
    ///
    /// Reads:
    /// - `TALLYBOOK_SYNC_MAX_ATTEMPTS`
    /// - `TALLYBOOK_SYNC_POLL_MS`
    /// - `TALLYBOOK_SYNC_DRAIN_SECS`
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a variable lookup. Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup("TALLYBOOK_SYNC_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self = self.with_max_attempts(n);
        }
        if let Some(ms) = lookup("TALLYBOOK_SYNC_POLL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("TALLYBOOK_SYNC_DRAIN_SECS").and_then(|v| v.parse().ok()) {
            self.drain_timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Sets the attempt ceiling (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the worker poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the shutdown drain budget.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the drain progress interval.
    #[must_use]
    pub const fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WriteBehindConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.drain_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_env_overrides() {
        let config = WriteBehindConfig::new().with_env_overrides(|key| match key {
            "TALLYBOOK_SYNC_MAX_ATTEMPTS" => Some("5".to_string()),
            "TALLYBOOK_SYNC_POLL_MS" => Some("250".to_string()),
            "TALLYBOOK_SYNC_DRAIN_SECS" => Some("nope".to_string()),
            _ => None,
        });
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(WriteBehindConfig::new().with_max_attempts(0).max_attempts, 1);
    }
}
