//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ASTRAL_*)
//! 2. TOML config file (if ASTRAL_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ASTRAL_*)
/// 2. TOML config file (if ASTRAL_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the worker is registered for; relative request URLs resolve against it.
    ///
    /// Set via ASTRAL_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to the SQLite database holding caches and sync queues.
    ///
    /// Set via ASTRAL_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for outgoing requests.
    ///
    /// Set via ASTRAL_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network attempt timeout in milliseconds.
    ///
    /// Set via ASTRAL_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted per response body.
    ///
    /// Set via ASTRAL_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Cache version suffix; caches with any other suffix are deleted on activation.
    ///
    /// Set via ASTRAL_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Retention for the crisis sync queue, in hours.
    ///
    /// Set via ASTRAL_CRISIS_RETENTION_HOURS environment variable.
    #[serde(default = "default_crisis_retention_hours")]
    pub crisis_retention_hours: i64,

    /// Retention for the general sync queue, in hours.
    ///
    /// Set via ASTRAL_GENERAL_RETENTION_HOURS environment variable.
    #[serde(default = "default_general_retention_hours")]
    pub general_retention_hours: i64,

    /// VAPID public key sent when subscribing to push.
    ///
    /// Set via ASTRAL_VAPID_PUBLIC_KEY environment variable.
    /// Required only when a page asks to subscribe.
    #[serde(default)]
    pub vapid_public_key: Option<String>,

    /// Function path that registers push subscriptions.
    ///
    /// Set via ASTRAL_PUSH_SUBSCRIBE_PATH environment variable.
    #[serde(default = "default_push_subscribe_path")]
    pub push_subscribe_path: String,
}

fn default_origin() -> String {
    "http://localhost:8888".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./astral-offline.sqlite")
}

fn default_user_agent() -> String {
    "astral-worker/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_cache_version() -> String {
    "v2".into()
}

fn default_crisis_retention_hours() -> i64 {
    24 * 7
}

fn default_general_retention_hours() -> i64 {
    24 * 3
}

fn default_push_subscribe_path() -> String {
    "/.netlify/functions/push-subscribe".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            cache_version: default_cache_version(),
            crisis_retention_hours: default_crisis_retention_hours(),
            general_retention_hours: default_general_retention_hours(),
            vapid_public_key: None,
            push_subscribe_path: default_push_subscribe_path(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Crisis queue retention window.
    pub fn crisis_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.crisis_retention_hours)
    }

    /// General queue retention window.
    pub fn general_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.general_retention_hours)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `ASTRAL_`
    /// 2. TOML file from `ASTRAL_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ASTRAL_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ASTRAL_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if a VAPID key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the VAPID public key is not set.
    pub fn require_vapid_public_key(&self) -> Result<&str, ConfigError> {
        self.vapid_public_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "vapid_public_key".into(),
            hint: "Set ASTRAL_VAPID_PUBLIC_KEY environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.origin, "http://localhost:8888");
        assert_eq!(config.db_path, PathBuf::from("./astral-offline.sqlite"));
        assert_eq!(config.user_agent, "astral-worker/0.1");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.cache_version, "v2");
        assert_eq!(config.crisis_retention_hours, 168);
        assert_eq!(config.general_retention_hours, 72);
        assert!(config.vapid_public_key.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_retention_windows() {
        let config = AppConfig::default();
        assert_eq!(config.crisis_retention(), chrono::Duration::days(7));
        assert_eq!(config.general_retention(), chrono::Duration::days(3));
    }

    #[test]
    fn test_require_vapid_key_missing() {
        let config = AppConfig::default();
        let result = config.require_vapid_public_key();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_vapid_key_present() {
        let config = AppConfig { vapid_public_key: Some("BEl62iUYgU".into()), ..Default::default() };
        assert_eq!(config.require_vapid_public_key().unwrap(), "BEl62iUYgU");
    }
}
