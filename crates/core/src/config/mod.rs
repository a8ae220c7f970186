//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HERO_SW_*)
//! 2. TOML config file (if HERO_SW_CONFIG_FILE set)
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

/// Tag used for deferred question-answer submissions.
pub const MEMORY_QUESTIONS_TAG: &str = "sync-memory-questions";

/// Tag used for deferred goal-progress updates.
pub const GOAL_UPDATES_TAG: &str = "sync-goal-updates";

/// Binds a background-sync tag to the queue namespace holding its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueConfig {
    pub tag: String,
    pub namespace: String,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HERO_SW_*)
/// 2. TOML config file (if HERO_SW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite database holding caches and queues.
    ///
    /// Set via HERO_SW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application; relative request paths resolve against it.
    ///
    /// Set via HERO_SW_APP_ORIGIN environment variable.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Display name, used as the default notification title.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Prefix of every response cache namespace.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deploy identifier. Bumping it retires every older cache on activation.
    ///
    /// Set via HERO_SW_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Paths pre-cached at install time.
    #[serde(default = "default_install_manifest")]
    pub install_manifest: Vec<String>,

    /// User-Agent string for outgoing requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional network timeout in milliseconds before falling back to cache.
    ///
    /// Unset means the interceptor waits for the network to settle.
    #[serde(default)]
    pub network_timeout_ms: Option<u64>,

    /// Only intercept requests to `app_origin`.
    #[serde(default = "default_true")]
    pub same_origin_only: bool,

    /// Activate right after install instead of waiting for an explicit call.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Seconds between scheduled reconciliation passes.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Deferred action queues, one per background-sync tag.
    #[serde(default = "default_sync_queues")]
    pub sync_queues: Vec<SyncQueueConfig>,

    /// Route opened by the "open dashboard" notification action.
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./hero-sw.sqlite")
}

fn default_app_origin() -> String {
    "http://localhost:5000".into()
}

fn default_app_name() -> String {
    "My IEP Hero".into()
}

fn default_cache_prefix() -> String {
    "iep-hero".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_install_manifest() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "hero-sw/0.1".into()
}

fn default_true() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_sync_queues() -> Vec<SyncQueueConfig> {
    vec![
        SyncQueueConfig { tag: MEMORY_QUESTIONS_TAG.into(), namespace: "pending-memory-questions".into() },
        SyncQueueConfig { tag: GOAL_UPDATES_TAG.into(), namespace: "pending-goal-updates".into() },
    ]
}

fn default_dashboard_path() -> String {
    "/dashboard".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            app_origin: default_app_origin(),
            app_name: default_app_name(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            install_manifest: default_install_manifest(),
            user_agent: default_user_agent(),
            network_timeout_ms: None,
            same_origin_only: true,
            skip_waiting: true,
            sync_interval_secs: default_sync_interval_secs(),
            sync_queues: default_sync_queues(),
            dashboard_path: default_dashboard_path(),
        }
    }
}

impl AppConfig {
    /// Name of the response cache for the current version, e.g. `iep-hero-v1`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Network timeout as Duration for use with reqwest, if configured.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    /// Interval of the reconciliation scheduler.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Look up the queue bound to a sync tag.
    pub fn queue_for_tag(&self, tag: &str) -> Option<&SyncQueueConfig> {
        self.sync_queues.iter().find(|q| q.tag == tag)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HERO_SW_`
    /// 2. TOML file from `HERO_SW_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("HERO_SW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HERO_SW_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
