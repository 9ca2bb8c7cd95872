//! Structured logging configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "TALLYBOOK_LOG_FORMAT";

/// Environment variable naming a log file.
pub const LOG_FILE_ENV: &str = "TALLYBOOK_LOG_FILE";

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }

    /// Returns the format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Optional file to append logs to instead of stderr.
    pub file: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Creates a logging config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logging config from environment variables.
    ///
    /// Reads `TALLYBOOK_LOG_FORMAT` and `TALLYBOOK_LOG_FILE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a variable lookup.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            self.format = LogFormat::parse(&format);
        }
        if let Some(file) = lookup(LOG_FILE_ENV).filter(|f| !f.trim().is_empty()) {
            self.file = Some(PathBuf::from(file));
        }
        self
    }

    /// Raises the filter to `debug` for verbose CLI runs.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.filter = "debug".to_string();
        }
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the log file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Builds the event filter, preferring `RUST_LOG` when set.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (LOG_FORMAT_ENV, "json"),
            (LOG_FILE_ENV, "/var/log/tallybook.log"),
        ]
        .into_iter()
        .collect();

        let config =
            LoggingConfig::new().with_env_overrides(|k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/tallybook.log")));
    }

    #[test]
    fn test_blank_log_file_is_ignored() {
        let config = LoggingConfig::new().with_env_overrides(|k| {
            (k == LOG_FILE_ENV).then(|| "  ".to_string())
        });
        assert!(config.file.is_none());
    }

    #[test]
    fn test_verbose_raises_filter() {
        assert_eq!(LoggingConfig::new().verbose(true).filter, "debug");
        assert_eq!(LoggingConfig::new().verbose(false).filter, "info");
    }
}
