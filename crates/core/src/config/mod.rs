//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELL_CACHE_*)
//! 2. TOML config file (if SHELL_CACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! List-valued fields take figment's array syntax in the environment,
//! e.g. `SHELL_CACHE_PRECACHE='["/", "/offline.html"]'`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// `db_path` value that selects the in-memory store instead of SQLite.
pub const IN_MEMORY_DB: &str = ":memory:";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELL_CACHE_*)
/// 2. TOML config file (if SHELL_CACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version-stamped name of the one current cache bucket.
    ///
    /// Bump it whenever `precache` changes so the next activation purges
    /// the previous version's bucket.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the worker is registered for. Relative URLs resolve against it
    /// and responses from it are classified as `basic`.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path of the page served when a navigation cannot be answered.
    ///
    /// Must be listed in `precache`.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Ordered manifest of URLs stored at install time.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Pathname substrings served cache-first.
    #[serde(default = "default_cache_first")]
    pub cache_first: Vec<String>,

    /// Pathname substrings served network-first.
    #[serde(default = "default_network_first")]
    pub network_first: Vec<String>,

    /// Path of the SQLite cache database, or `:memory:`.
    ///
    /// Set via SHELL_CACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network timeout in milliseconds before a strategy falls back to cache.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted per network response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_cache_name() -> String {
    "ict-site-v1".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/offline.html",
        "/manifest.json",
        "/favicon.ico",
        "/logo.png",
        "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_cache_first() -> Vec<String> {
    [
        "/static/", "/assets/", "/images/", ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico",
        ".woff", ".woff2", ".ttf",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_network_first() -> Vec<String> {
    ["/api/", "/services/", "/pricing", "/survey", "/links", "/contact"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shell-cache.sqlite")
}

fn default_user_agent() -> String {
    "shell-cache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            origin: default_origin(),
            offline_page: default_offline_page(),
            precache: default_precache(),
            cache_first: default_cache_first(),
            network_first: default_network_first(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed worker origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Whether the cache should live in memory rather than in SQLite.
    pub fn uses_memory_store(&self) -> bool {
        self.db_path == Path::new(IN_MEMORY_DB)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELL_CACHE_`
    /// 2. TOML file from `SHELL_CACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("SHELL_CACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELL_CACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_name, "ict-site-v1");
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.offline_page, "/offline.html");
        assert!(config.precache.contains(&"/offline.html".to_string()));
        assert!(config.cache_first.contains(&".png".to_string()));
        assert!(config.network_first.contains(&"/services/".to_string()));
        assert_eq!(config.db_path, PathBuf::from("./shell-cache.sqlite"));
        assert_eq!(config.timeout_ms, 10_000);
        assert!(!config.uses_memory_store());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig::default();
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:3000/");

        let bad = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(bad.origin_url(), Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_memory_store_selection() {
        let config = AppConfig { db_path: PathBuf::from(IN_MEMORY_DB), ..Default::default() };
        assert!(config.uses_memory_store());
    }

    #[test]
    fn test_load_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "shell-cache.toml",
                r#"
                cache_name = "ict-site-v2"
                timeout_ms = 2500
                "#,
            )?;
            jail.set_env("SHELL_CACHE_CONFIG_FILE", "shell-cache.toml");
            jail.set_env("SHELL_CACHE_TIMEOUT_MS", "4000");
            jail.set_env("SHELL_CACHE_DB_PATH", ":memory:");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.cache_name, "ict-site-v2");
            assert_eq!(config.timeout_ms, 4000);
            assert!(config.uses_memory_store());
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHELL_CACHE_TIMEOUT_MS", "5");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
            Ok(())
        });
    }
}
