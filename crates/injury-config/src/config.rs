//! Configuration management for the client.

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default backend URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://injury-reports.supabase.co",
};

/// Default publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Deep link the password-reset email points back to.
pub const DEFAULT_RESET_REDIRECT_URL: &str = match option_env!("INJURY_RESET_REDIRECT_URL") {
    Some(url) => url,
    None => "injuryreports://reset-password",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retry policy for access-token refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    /// Maximum number of refresh attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Refresh when fewer than this many seconds of validity remain.
    pub expiry_margin_secs: i64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            expiry_margin_secs: 60,
        }
    }
}

impl RefreshPolicy {
    /// Delay before the given retry attempt (0-indexed), doubling and capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Publishable API key (public, safe to ship in the app).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Where password-reset emails send the user back to.
    #[serde(default = "default_reset_redirect_url")]
    pub reset_redirect_url: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Token refresh retry policy.
    #[serde(default)]
    pub refresh: RefreshPolicy,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_reset_redirect_url() -> String {
    DEFAULT_RESET_REDIRECT_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            reset_redirect_url: default_reset_redirect_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh: RefreshPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override values from environment variables.
    ///
    /// Recognized: `INJURY_LOG_LEVEL`, `INJURY_SUPABASE_URL`,
    /// `INJURY_SUPABASE_KEY`, `INJURY_RESET_REDIRECT_URL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(level) = non_empty("INJURY_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("INJURY_SUPABASE_URL") {
            self.supabase_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = non_empty("INJURY_SUPABASE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(url) = non_empty("INJURY_RESET_REDIRECT_URL") {
            self.reset_redirect_url = url;
        }
    }

    /// Check that URLs parse and numeric settings are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        self.supabase_url()?;
        Url::parse(&self.reset_redirect_url)?;

        if self.supabase_publishable_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "supabase_publishable_key must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.refresh.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "refresh.max_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the backend URL as a parsed URL.
    pub fn supabase_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.supabase_url).map_err(ConfigError::from)
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.reset_redirect_url, DEFAULT_RESET_REDIRECT_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.refresh, RefreshPolicy::default());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.supabase_url = "https://project.example.com".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.supabase_url, "https://project.example.com");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert!(!config.supabase_publishable_key.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("INJURY_LOG_LEVEL", "warn"),
            ("INJURY_SUPABASE_URL", "https://other.example.com/"),
            ("INJURY_SUPABASE_KEY", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.supabase_url, "https://other.example.com");
        // Blank values are ignored.
        assert_eq!(config.supabase_publishable_key, DEFAULT_SUPABASE_PUBLISHABLE_KEY);
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.supabase_url = "not a valid url".to_string();

        assert!(config.supabase_url().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_retries() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.refresh.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_refresh_delay_backoff_is_capped() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5000));
    }
}
