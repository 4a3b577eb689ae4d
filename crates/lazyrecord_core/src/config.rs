//! Store and logging configuration.
//!
//! # Responsibility
//! - Hold tunables for one store (`StoreConfig`) and for process logging
//!   (`LogConfig`).
//! - Validate and normalize values before they reach the engine.
//!
//! # Invariants
//! - Every field has a default; partial JSON documents are accepted.
//! - Log levels are normalized to the `log` crate names.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_FLUSH_JOBS: usize = 100_000;

/// Per-store tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on deferred jobs drained by one batch end.
    pub max_flush_jobs: usize,
    /// Emit debug-level events for links, computes and flushes.
    pub log_mutations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_flush_jobs: DEFAULT_MAX_FLUSH_JOBS,
            log_mutations: true,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON document. Missing keys take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_flush_jobs",
                detail: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Process logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace|debug|info|warn|error`; `warning` is accepted.
    pub level: String,
    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    pub fn stderr(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: None,
        }
    }

    pub fn file(level: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            log_dir: Some(log_dir.into()),
        }
    }

    /// Returns the normalized level name.
    pub fn normalized_level(&self) -> Result<&'static str, ConfigError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" => Ok("error"),
            other => Err(ConfigError::InvalidValue {
                key: "level",
                detail: format!(
                    "unsupported log level `{other}`; expected trace|debug|info|warn|error"
                ),
            }),
        }
    }

    /// Returns the log directory, which must be absolute when set.
    pub fn normalized_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(dir) = &self.log_dir else {
            return Ok(None);
        };
        let raw = dir.to_string_lossy();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "log_dir",
                detail: "cannot be empty".to_string(),
            });
        }
        let path = Path::new(trimmed);
        if !path.is_absolute() {
            return Err(ConfigError::InvalidValue {
                key: "log_dir",
                detail: format!("must be an absolute path, got `{trimmed}`"),
            });
        }
        Ok(Some(path.to_path_buf()))
    }
}

/// Returns the default log level for current build mode.
///
/// - `debug` builds -> `debug`
/// - `release` builds -> `info`
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Configuration parse or validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidValue { key: &'static str, detail: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "config parse failed: {message}"),
            Self::InvalidValue { key, detail } => write!(f, "invalid config `{key}`: {detail}"),
        }
    }
}

impl Error for ConfigError {}
