//! Strategy classification for intercepted requests.
//!
//! Precedence, first match wins:
//! 1. non-GET: not intercepted
//! 2. app shell (`/`, `/index.html`, any path containing `/index.html`): document
//! 3. any `cache_first` substring in the pathname: cache-first
//! 4. any `network_first` substring in the pathname: network-first
//! 5. everything else: generic fallback

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{AppConfig, Request};

/// Caching strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// App shell: network first, cache, then offline page.
    Document,
    CacheFirst,
    NetworkFirst,
    /// Cache first, caching only same-origin 200 responses.
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Document => "document",
            Strategy::CacheFirst => "cache_first",
            Strategy::NetworkFirst => "network_first",
            Strategy::Fallback => "fallback",
        }
    }
}

/// Pathname substring tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyTables {
    pub cache_first: Vec<String>,
    pub network_first: Vec<String>,
}

impl From<&AppConfig> for StrategyTables {
    fn from(config: &AppConfig) -> Self {
        Self { cache_first: config.cache_first.clone(), network_first: config.network_first.clone() }
    }
}

/// Maps requests to strategies using immutable tables.
#[derive(Debug, Clone)]
pub struct CacheStrategyRouter {
    tables: StrategyTables,
}

impl CacheStrategyRouter {
    pub fn new(tables: StrategyTables) -> Self {
        Self { tables }
    }

    /// Pick the strategy for `request`, or `None` if it must not be intercepted.
    pub fn classify(&self, request: &Request) -> Option<Strategy> {
        if !request.is_get() {
            return None;
        }

        let path = request.path();
        let strategy = if is_app_shell(path) {
            Strategy::Document
        } else if matches_any(path, &self.tables.cache_first) {
            Strategy::CacheFirst
        } else if matches_any(path, &self.tables.network_first) {
            Strategy::NetworkFirst
        } else {
            Strategy::Fallback
        };
        Some(strategy)
    }
}

fn is_app_shell(path: &str) -> bool {
    path == "/" || path == "/index.html" || path.contains("/index.html")
}

fn matches_any(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| path.contains(p.as_str()))
}
