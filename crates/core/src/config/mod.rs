//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (INSTAGO_*)
//! 2. TOML config file (if INSTAGO_CONFIG_FILE set)
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
/// 1. Environment variables (INSTAGO_*)
/// 2. TOML config file (if INSTAGO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the InstaGo REST API.
    ///
    /// Set via INSTAGO_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token for authenticated API calls.
    ///
    /// Set via INSTAGO_API_TOKEN environment variable. Required only when
    /// a network call is actually issued.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Path to the SQLite cache database.
    ///
    /// Set via INSTAGO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// TTL for the cached screenshot collection (default 15 minutes).
    #[serde(default = "default_screenshot_ttl_ms")]
    pub screenshot_ttl_ms: i64,

    /// TTL for cached thumbnails (default 7 days).
    #[serde(default = "default_thumbnail_ttl_ms")]
    pub thumbnail_ttl_ms: i64,

    /// TTL for cached search results (default 5 minutes).
    #[serde(default = "default_search_ttl_ms")]
    pub search_ttl_ms: i64,

    /// Minimum interval between incremental syncs (default 2 minutes).
    /// Deliberately shorter than `screenshot_ttl_ms` so incremental checks
    /// fire more often than full refreshes.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: i64,

    /// Base interval for the background refresh scheduler (default 15
    /// minutes; the scheduler ticks at a quarter of this, capped at 5
    /// minutes).
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Page size for full list fetches.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,

    /// Page size cap for incremental (`since`-parameterized) fetches.
    #[serde(default = "default_incremental_limit")]
    pub incremental_limit: u32,

    /// Debounce window for search-as-you-type, in milliseconds.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Whether thumbnails are generated and cached at all.
    #[serde(default = "default_true")]
    pub thumbnails_enabled: bool,

    /// Thumbnail bounding-box width in pixels.
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,

    /// Thumbnail bounding-box height in pixels.
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,

    /// JPEG quality for encoded thumbnails (1-100).
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

fn default_api_base_url() -> String {
    "https://instago-server-fbtibvhmga-uc.a.run.app/api/v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./instago-cache.sqlite")
}

fn default_user_agent() -> String {
    "instago/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_screenshot_ttl_ms() -> i64 {
    15 * 60 * 1000
}

fn default_thumbnail_ttl_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}

fn default_search_ttl_ms() -> i64 {
    5 * 60 * 1000
}

fn default_sync_interval_ms() -> i64 {
    2 * 60 * 1000
}

fn default_refresh_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_list_page_size() -> u32 {
    20
}

fn default_incremental_limit() -> u32 {
    50
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_thumbnail_height() -> u32 {
    200
}

fn default_thumbnail_quality() -> u8 {
    80
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            screenshot_ttl_ms: default_screenshot_ttl_ms(),
            thumbnail_ttl_ms: default_thumbnail_ttl_ms(),
            search_ttl_ms: default_search_ttl_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            list_page_size: default_list_page_size(),
            incremental_limit: default_incremental_limit(),
            search_debounce_ms: default_search_debounce_ms(),
            thumbnails_enabled: true,
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
            thumbnail_quality: default_thumbnail_quality(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base refresh interval as Duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Search debounce window as Duration.
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `INSTAGO_`
    /// 2. TOML file from `INSTAGO_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("INSTAGO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("INSTAGO_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check that an API token is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no token is configured.
    pub fn require_api_token(&self) -> Result<&str, ConfigError> {
        self.api_token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_token".into(),
            hint: "Set INSTAGO_API_TOKEN environment variable".into(),
        })
    }
}
