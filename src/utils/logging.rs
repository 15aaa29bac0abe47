//! Process logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or an embedding application) through [`init_logging`].

use serde::{Deserialize, Serialize};
use std::fmt as stdfmt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl stdfmt::Display for LogLevel {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Machine-readable, one JSON object per event
    Json,
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Directive filter overriding `level`, e.g. "discharge_locator=debug"
    pub filter: Option<String>,
}

impl LogConfig {
    /// Errors only, one line each
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            filter: None,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter from the explicit directive, then `RUST_LOG`, then the level
    pub fn env_filter(&self) -> EnvFilter {
        match self.filter {
            Some(ref custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| EnvFilter::new(self.level.to_string())),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string())),
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` when a subscriber was already installed; that one stays.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = config.env_filter();

    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr)),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr)),
        ),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "global subscriber already installed, keeping it");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LogConfig = serde_json::from_str(r#"{ "format": "json" }"#).unwrap();

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_init_twice_keeps_first_subscriber() {
        init_logging(&LogConfig::quiet());
        assert!(!init_logging(&LogConfig::default().with_format(LogFormat::Json)));
    }
}
