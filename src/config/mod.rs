//! Configuration management.
//!
//! Configuration is layered: defaults, then a TOML file, then environment
//! variables. CLI flags are applied by the binary on top.

mod write_behind;

pub use crate::observability::{LogFormat, LoggingConfig};
pub use write_behind::{
    DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, WriteBehindConfig,
};

use crate::gc::DEFAULT_RETENTION_DAYS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TALLYBOOK_CONFIG_PATH";

/// File name of the export inside the data directory.
pub const DEFAULT_EXPORT_FILE: &str = "gastos.csv";

/// Extension of the cache database derived from the export path.
pub const CACHE_EXTENSION: &str = "cache.db";

/// Main configuration for tallybook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallybookConfig {
    /// Directory holding the default stores.
    pub data_dir: PathBuf,
    /// Export file path; defaults to `<data_dir>/gastos.csv`.
    pub export_path: Option<PathBuf>,
    /// Cache database path; defaults to the export path with extension `cache.db`.
    pub cache_path: Option<PathBuf>,
    /// Retention period for cached verdicts in days.
    pub retention_days: u32,
    /// Write-behind tuning.
    pub write_behind: WriteBehindConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Export file path.
    pub export_path: Option<String>,
    /// Cache database path.
    pub cache_path: Option<String>,
    /// Retention period in days.
    pub retention_days: Option<u32>,
    /// Write-behind section.
    pub write_behind: Option<ConfigFileWriteBehind>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Write-behind section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWriteBehind {
    /// Attempt ceiling per job.
    pub max_attempts: Option<u32>,
    /// Worker poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Shutdown drain budget in seconds.
    pub drain_timeout_secs: Option<u64>,
    /// Drain progress interval in milliseconds.
    pub drain_poll_interval_ms: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl Default for TallybookConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tallybook"),
            export_path: None,
            cache_path: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            write_behind: WriteBehindConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TallybookConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration the way the CLI does.
    ///
    /// Uses `path` if given, else `TALLYBOOK_CONFIG_PATH`, else the default
    /// locations; then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let config = match explicit {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::operation("read_config_file", format!("{}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/.config/tallybook/` on Linux)
    /// 2. XDG-style `~/.config/tallybook/` for macOS users
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("tallybook").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("tallybook")
                .join("config.toml"),
        ];

        for candidate in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `TallybookConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.export_path = file.export_path.map(PathBuf::from);
        config.cache_path = file.cache_path.map(PathBuf::from);
        if let Some(days) = file.retention_days {
            config.retention_days = days;
        }
        if let Some(wb) = file.write_behind {
            if let Some(n) = wb.max_attempts {
                config.write_behind = config.write_behind.with_max_attempts(n);
            }
            if let Some(ms) = wb.poll_interval_ms {
                config.write_behind.poll_interval = Duration::from_millis(ms);
            }
            if let Some(secs) = wb.drain_timeout_secs {
                config.write_behind.drain_timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = wb.drain_poll_interval_ms {
                config.write_behind.drain_poll_interval = Duration::from_millis(ms);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.file = logging.file.map(PathBuf::from);
            if let Some(filter) = logging.filter {
                config.logging.filter = filter;
            }
        }

        config
    }

    /// Applies environment overrides from a variable lookup.
    ///
    /// Reads `TALLYBOOK_DATA_DIR`, `TALLYBOOK_EXPORT_PATH`,
    /// `TALLYBOOK_CACHE_PATH`, `TALLYBOOK_RETENTION_DAYS` plus the
    /// write-behind and logging variables.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty("TALLYBOOK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty("TALLYBOOK_EXPORT_PATH") {
            self.export_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("TALLYBOOK_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(path));
        }
        if let Some(days) = non_empty(crate::gc::RETENTION_DAYS_ENV).and_then(|v| v.parse().ok()) {
            self.retention_days = days;
        }
        self.write_behind = self.write_behind.with_env_overrides(&lookup);
        self.logging = self.logging.with_env_overrides(&lookup);
        self
    }

    /// Returns the export file path in effect.
    #[must_use]
    pub fn resolved_export_path(&self) -> PathBuf {
        self.export_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_EXPORT_FILE))
    }

    /// Returns the cache database path in effect.
    #[must_use]
    pub fn resolved_cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.resolved_export_path().with_extension(CACHE_EXTENSION))
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the export file path.
    #[must_use]
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    /// Sets the cache database path.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Sets the retention period.
    #[must_use]
    pub const fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the write-behind tuning.
    #[must_use]
    pub const fn with_write_behind(mut self, write_behind: WriteBehindConfig) -> Self {
        self.write_behind = write_behind;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}
