//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_prefix`, `cache_version` or `user_agent` is empty
    /// - `app_origin` is not an http(s) origin
    /// - a manifest path or `dashboard_path` is not absolute
    /// - `network_timeout_ms` is below 100ms or above 5 minutes
    /// - `sync_interval_secs` is 0
    /// - two sync queues share a tag or a namespace
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_prefix.trim().is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.trim().is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !(self.app_origin.starts_with("http://") || self.app_origin.starts_with("https://")) {
            return Err(invalid("app_origin", "must start with http:// or https://"));
        }

        if let Some(path) = self.install_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("install_manifest", format!("path {path:?} must start with '/'")));
        }
        if !self.dashboard_path.starts_with('/') {
            return Err(invalid("dashboard_path", "must start with '/'"));
        }

        if let Some(timeout_ms) = self.network_timeout_ms {
            if timeout_ms < 100 {
                return Err(invalid("network_timeout_ms", "must be at least 100ms"));
            }
            if timeout_ms > 300_000 {
                return Err(invalid("network_timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.sync_interval_secs == 0 {
            return Err(invalid("sync_interval_secs", "must be greater than 0"));
        }

        let mut tags = HashSet::new();
        let mut namespaces = HashSet::new();
        for queue in &self.sync_queues {
            if queue.tag.is_empty() || queue.namespace.is_empty() {
                return Err(invalid("sync_queues", "tag and namespace must not be empty"));
            }
            if !tags.insert(queue.tag.as_str()) {
                return Err(invalid("sync_queues", format!("duplicate tag {}", queue.tag)));
            }
            if !namespaces.insert(queue.namespace.as_str()) {
                return Err(invalid("sync_queues", format!("duplicate namespace {}", queue.namespace)));
            }
        }

        if self.sync_queues.is_empty() {
            tracing::warn!("no sync queues configured; deferred actions will be rejected");
        }

        Ok(())
    }
}
