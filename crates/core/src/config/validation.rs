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
    /// - any TTL or interval is not positive
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `thumbnail_quality` is outside 1-100
    /// - `thumbnail_width`/`thumbnail_height` is 0
    /// - `user_agent` or `api_base_url` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Invalid { field: "api_base_url".into(), reason: "must not be empty".into() });
        }
        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
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

        for (field, value) in [
            ("screenshot_ttl_ms", self.screenshot_ttl_ms),
            ("thumbnail_ttl_ms", self.thumbnail_ttl_ms),
            ("search_ttl_ms", self.search_ttl_ms),
            ("sync_interval_ms", self.sync_interval_ms),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be greater than 0".into() });
            }
        }

        if self.sync_interval_ms > self.screenshot_ttl_ms {
            tracing::warn!(
                sync_interval_ms = self.sync_interval_ms,
                screenshot_ttl_ms = self.screenshot_ttl_ms,
                "sync_interval_ms exceeds screenshot_ttl_ms; incremental checks \
                 will fire less often than full refreshes"
            );
        }

        if self.thumbnail_quality == 0 || self.thumbnail_quality > 100 {
            return Err(ConfigError::Invalid {
                field: "thumbnail_quality".into(),
                reason: "must be between 1 and 100".into(),
            });
        }
        if self.thumbnail_width == 0 || self.thumbnail_height == 0 {
            return Err(ConfigError::Invalid {
                field: "thumbnail_dimensions".into(),
                reason: "width and height must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
