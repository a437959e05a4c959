//! Caching strategy handlers.
//!
//! | Strategy      | Primary | Secondary | Stored when              | Last resort                     |
//! |---------------|---------|-----------|--------------------------|---------------------------------|
//! | document      | network | cache     | status 200               | offline page                    |
//! | cache-first   | cache   | network   | status 200               | offline page if navigation      |
//! | network-first | network | cache     | status 200               | offline page                    |
//! | fallback      | cache   | network   | status 200 and `basic`   | offline page if navigation      |
//!
//! Handlers never return an error. Network failures and timeouts fall back
//! to cache, cache read failures count as misses, and write failures are
//! logged. Cache writes run as background tasks tracked in a `JoinSet`.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::Fetcher;
use shellcache_core::{CacheStorage, Error, Request, Response, ResponseType};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::router::Strategy;

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The cached offline page.
    Offline,
    /// Generated 503 when even the offline page is missing.
    Synthesized,
}

/// Result of handling one fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs its default network fetch.
    Passthrough,
    Responded { strategy: Strategy, source: ResponseSource, response: Response },
    /// Intercepted but resolved without a response (the page sees a network error).
    NoResponse { strategy: Strategy },
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Responded { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Responded { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Responded { strategy, .. } | FetchOutcome::NoResponse { strategy } => Some(*strategy),
        }
    }
}

/// Shared state for the strategy handlers.
pub struct Strategies {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    cache_name: String,
    offline_request: Request,
    timeout: Duration,
    writes: Mutex<JoinSet<()>>,
}

impl Strategies {
    pub fn new(
        storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, cache_name: String, offline_request: Request,
        timeout: Duration,
    ) -> Self {
        Self { storage, fetcher, cache_name, offline_request, timeout, writes: Mutex::new(JoinSet::new()) }
    }

    /// Run `strategy` for `request`.
    pub async fn run(&self, strategy: Strategy, request: &Request) -> FetchOutcome {
        match strategy {
            Strategy::Document | Strategy::NetworkFirst => self.network_first(strategy, request).await,
            Strategy::CacheFirst => self.cache_first(strategy, request, |res| res.status == 200).await,
            Strategy::Fallback => {
                self.cache_first(strategy, request, |res| {
                    res.status == 200 && res.response_type == ResponseType::Basic
                })
                .await
            }
        }
    }

    /// Fetch from the network, racing the configured timeout.
    pub async fn network(&self, request: &Request) -> Result<Response, Error> {
        match tokio::time::timeout(self.timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(format!("{} after {}ms", request.url, self.timeout.as_millis()))),
        }
    }

    /// Wait for every background cache write started so far.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.writes.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "cache write task failed");
            }
        }
    }

    async fn network_first(&self, strategy: Strategy, request: &Request) -> FetchOutcome {
        match self.network(request).await {
            Ok(response) => {
                if response.status == 200 {
                    self.store_in_background(request, &response).await;
                }
                FetchOutcome::Responded { strategy, source: ResponseSource::Network, response }
            }
            Err(e) => {
                log_network_failure(request, &e);
                match self.cached(request).await {
                    Some(response) => FetchOutcome::Responded { strategy, source: ResponseSource::Cache, response },
                    None => self.offline(strategy, request).await,
                }
            }
        }
    }

    async fn cache_first(
        &self, strategy: Strategy, request: &Request, cacheable: impl Fn(&Response) -> bool,
    ) -> FetchOutcome {
        if let Some(response) = self.cached(request).await {
            tracing::debug!(url = %request.url, strategy = strategy.as_str(), "cache hit");
            return FetchOutcome::Responded { strategy, source: ResponseSource::Cache, response };
        }

        match self.network(request).await {
            Ok(response) => {
                if cacheable(&response) {
                    self.store_in_background(request, &response).await;
                } else {
                    tracing::debug!(
                        url = %request.url,
                        status = response.status,
                        response_type = %response.response_type,
                        "response not cacheable"
                    );
                }
                FetchOutcome::Responded { strategy, source: ResponseSource::Network, response }
            }
            Err(e) => {
                log_network_failure(request, &e);
                if request.is_navigation() {
                    self.offline(strategy, request).await
                } else {
                    FetchOutcome::NoResponse { strategy }
                }
            }
        }
    }

    async fn cached(&self, request: &Request) -> Option<Response> {
        match self.storage.match_request(&self.cache_name, request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn offline(&self, strategy: Strategy, request: &Request) -> FetchOutcome {
        match self.cached(&self.offline_request).await {
            Some(response) => FetchOutcome::Responded { strategy, source: ResponseSource::Offline, response },
            None => {
                tracing::warn!(
                    url = %request.url,
                    offline_page = %self.offline_request.url,
                    "offline page missing from cache"
                );
                FetchOutcome::Responded {
                    strategy,
                    source: ResponseSource::Synthesized,
                    response: Response::service_unavailable(request.url.clone()),
                }
            }
        }
    }

    async fn store_in_background(&self, request: &Request, response: &Response) {
        let storage = Arc::clone(&self.storage);
        let bucket = self.cache_name.clone();
        let request = request.clone();
        let response = response.clone();

        let mut writes = self.writes.lock().await;
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            match storage.put(&bucket, &request, &response).await {
                Ok(()) => tracing::debug!(url = %request.url, bucket = %bucket, "cached response"),
                Err(e) => tracing::warn!(url = %request.url, bucket = %bucket, error = %e, "cache write failed"),
            }
        });
    }
}

/// Transport failures log at debug, anything else at warn.
fn log_network_failure(request: &Request, error: &Error) {
    if error.is_network() {
        tracing::debug!(url = %request.url, error = %error, "network failed, falling back");
    } else {
        tracing::warn!(url = %request.url, error = %error, "fetch failed, falling back");
    }
}
