//! # Observability
//!
//! Centralized structured logging for the injury reporting workspace.
//!
//! Crates are **log producers** only. They use the standard `tracing` macros
//! and never decide where output goes. A binary calls [`init_with_config`]
//! once at startup, which installs:
//!
//! - a JSONL file layer (one JSON object per event) under the app's log
//!   directory, so `tail -f ~/.injury-reports/logs/app.jsonl | jq` works;
//! - an optional compact stderr layer for foreground use.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "cli".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     })?;
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod sink;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use sink::{default_log_path, AppendLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli", "worker").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.injury-reports/logs/app.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Write JSONL to the log file.
    pub file_output: bool,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            file_output: true,
            also_stderr: false,
        }
    }
}

/// Error raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The log file (or its parent directory) could not be opened.
    #[error("failed to open log file {}: {}", .path.display(), .source)]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Initialize logging with default settings for a service.
pub fn init(service_name: &str) -> Result<(), InitError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns [`InitError::AlreadyInitialized`] if called twice in a process.
pub fn init_with_config(config: LogConfig) -> Result<(), InitError> {
    sink::init_subscriber(&config)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.file_output);
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_init_error_display() {
        let err = InitError::LogFile {
            path: PathBuf::from("/nope/app.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/app.jsonl"));
        assert_eq!(
            InitError::AlreadyInitialized.to_string(),
            "logging already initialized"
        );
    }
}
