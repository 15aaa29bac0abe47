use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::{DEFAULT_DIAGNOSTICS_FILE, DEFAULT_MAX_FIT_ERROR, DEFAULT_SINK_NAME};
use crate::utils::logging::LogConfig;

/// Top-level locator configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Reference search settings
    pub search: SearchConfig,
    /// Diagnostic sink settings
    pub diagnostics: DiagnosticsConfig,
    /// Process logging settings
    pub logging: LogConfig,
}

/// Reference search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates must fit strictly better than this (m^2)
    pub max_fit_error: f64,
    /// Evaluate rotations in parallel
    pub parallel: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_fit_error: DEFAULT_MAX_FIT_ERROR,
            parallel: false,
        }
    }
}

/// Where diagnostics are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Value of the `sink` field on diagnostic tracing events. The event
    /// target is always `discharge_locator::diagnostics`; filter on that.
    #[serde(alias = "target")]
    pub sink_name: String,
    /// File that receives warning and error diagnostics, if any
    pub log_file: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            sink_name: DEFAULT_SINK_NAME.to_string(),
            log_file: Some(PathBuf::from(DEFAULT_DIAGNOSTICS_FILE)),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LocatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a JSON config file; missing sections take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: LocatorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_fit_error = self.search.max_fit_error;
        if !max_fit_error.is_finite() || max_fit_error <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "search.max_fit_error",
                value: max_fit_error.to_string(),
                reason: "must be finite and positive",
            });
        }

        if self.diagnostics.sink_name.trim().is_empty() {
            return Err(ConfigError::InvalidParameter {
                parameter: "diagnostics.sink_name",
                value: self.diagnostics.sink_name.clone(),
                reason: "must not be empty",
            });
        }

        if let Some(ref filter) = self.logging.filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidParameter {
                    parameter: "logging.filter",
                    value: filter.clone(),
                    reason: "must not be empty when set",
                });
            }
        }

        Ok(())
    }

    pub fn with_max_fit_error(mut self, max_fit_error: f64) -> Self {
        self.search.max_fit_error = max_fit_error;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.search.parallel = parallel;
        self
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.diagnostics.log_file = path;
        self
    }

    pub fn with_sink_name(mut self, name: impl Into<String>) -> Self {
        self.diagnostics.sink_name = name.into();
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}
