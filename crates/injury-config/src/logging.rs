//! Logging initialization.
//!
//! Thin wrapper over the observability crate: every binary writes structured
//! JSONL to `~/.injury-reports/logs/app.jsonl` and optionally mirrors to stderr.

use crate::{ConfigResult, Paths};
use observability::LogConfig;

/// Initialize logging for the default service name (`"client"`).
///
/// The level comes from `RUST_LOG` when set, otherwise `level`.
pub fn init_logging(paths: &Paths, level: &str, also_stderr: bool) -> ConfigResult<()> {
    init_logging_for_service(paths, "client", level, also_stderr)
}

/// Initialize logging with a custom service name.
///
/// Use this to tell components apart in the shared log stream.
pub fn init_logging_for_service(
    paths: &Paths,
    service_name: &str,
    level: &str,
    also_stderr: bool,
) -> ConfigResult<()> {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        file_output: true,
        also_stderr,
    })?;
    Ok(())
}
