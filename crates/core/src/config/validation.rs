//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `cache_version` is empty or contains `-`
    /// - either retention window is not positive
    /// - `push_subscribe_path` does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: "must be an absolute http(s) URL".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.cache_version.is_empty() || self.cache_version.contains('-') {
            return Err(ConfigError::Invalid {
                field: "cache_version".into(),
                reason: "must be non-empty and contain no '-'".into(),
            });
        }

        if self.crisis_retention_hours <= 0 {
            return Err(ConfigError::Invalid {
                field: "crisis_retention_hours".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.general_retention_hours <= 0 {
            return Err(ConfigError::Invalid {
                field: "general_retention_hours".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.push_subscribe_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "push_subscribe_path".into(),
                reason: "must be an absolute path".into(),
            });
        }

        if self.crisis_retention_hours < self.general_retention_hours {
            tracing::warn!(
                crisis = self.crisis_retention_hours,
                general = self.general_retention_hours,
                "crisis queue retention is shorter than general queue retention"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_relative_origin() {
        let config = AppConfig { origin: "localhost:8888".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_bytes"));
    }

    #[test]
    fn test_validate_cache_version_with_dash() {
        let config = AppConfig { cache_version: "v2-beta".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache_version"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let config = AppConfig { general_retention_hours: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "general_retention_hours"));
    }

    #[test]
    fn test_validate_push_path() {
        let config = AppConfig { push_subscribe_path: "push-subscribe".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "push_subscribe_path"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { max_bytes: 1, timeout_ms: 100, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
