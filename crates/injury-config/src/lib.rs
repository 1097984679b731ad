//! Configuration, paths, and logging setup for the injury reporting client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RefreshPolicy, DEFAULT_LOG_LEVEL, DEFAULT_RESET_REDIRECT_URL, DEFAULT_SUPABASE_URL,
    DEFAULT_SUPABASE_PUBLISHABLE_KEY,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
