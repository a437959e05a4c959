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
    /// - `cache_name` or `user_agent` is empty
    /// - `origin` is not an http(s) URL
    /// - `offline_page` is not part of `precache`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - a strategy table contains an empty pattern
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: format!("unsupported scheme: {}", origin.scheme()),
            });
        }

        if self.offline_page.is_empty() {
            return Err(ConfigError::Missing {
                field: "offline_page".into(),
                hint: "Set SHELL_CACHE_OFFLINE_PAGE to a path listed in precache".into(),
            });
        }
        let offline_url = origin.join(&self.offline_page).ok();
        let precached = self.precache.iter().any(|entry| {
            entry == &self.offline_page || (offline_url.is_some() && origin.join(entry).ok() == offline_url)
        });
        if !precached {
            return Err(ConfigError::Invalid {
                field: "offline_page".into(),
                reason: format!("{} must be listed in precache", self.offline_page),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
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

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        for (field, table) in [("cache_first", &self.cache_first), ("network_first", &self.network_first)] {
            if table.iter().any(|p| p.is_empty()) {
                return Err(ConfigError::Invalid { field: field.into(), reason: "patterns must not be empty".into() });
            }
        }

        let overlap: Vec<&String> = self
            .cache_first
            .iter()
            .filter(|p| self.network_first.contains(p))
            .collect();
        if !overlap.is_empty() {
            tracing::warn!(
                ?overlap,
                "patterns listed in both cache_first and network_first; \
                 cache_first takes precedence"
            );
        }

        Ok(())
    }
}
