//! Configuration and logging setup

pub mod config;
pub mod logging;

pub use config::{ConfigError, DiagnosticsConfig, LocatorConfig, SearchConfig};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
