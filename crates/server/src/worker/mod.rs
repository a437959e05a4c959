//! The caching worker.
//!
//! [`ServiceWorker`] owns one cache bucket named after the deployed version
//! and reacts to three events:
//!
//! - `install`: pre-cache the manifest, all or nothing, then skip waiting
//! - `activate`: delete every other bucket, claim open clients and tell them
//!   the cache changed
//! - `fetch`: route GET requests to a caching strategy
//!
//! Every handler is an async fn; the host keeps the worker alive by awaiting
//! the returned future.

pub mod clients;
pub mod lifecycle;
pub mod router;
pub mod strategies;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::{join_all, try_join_all};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::{Fetcher, resolve};
use shellcache_core::{AppConfig, CacheStorage, Error, Request, RequestMode, Response};
use tokio::sync::mpsc;
use url::Url;

pub use clients::{ClientId, ClientMessage, Clients};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use router::{CacheStrategyRouter, Strategy, StrategyTables};
pub use strategies::{FetchOutcome, ResponseSource, Strategies};

/// Resolved, immutable worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub origin: Url,
    pub offline_page: Url,
    pub precache: Vec<Url>,
    pub tables: StrategyTables,
    pub timeout: Duration,
}

impl WorkerConfig {
    /// Resolve every configured path against the origin.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resolve_entry =
            |entry: &str| resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}")));

        let offline_page = resolve_entry(&config.offline_page)?;
        let precache = config
            .precache
            .iter()
            .map(|entry| resolve_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cache_name: config.cache_name.clone(),
            origin: origin.clone(),
            offline_page,
            precache,
            tables: StrategyTables::from(config),
            timeout: config.timeout(),
        })
    }
}

/// Lifecycle events a host can deliver.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
}

/// What a dispatched event produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Fetched(FetchOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstallReport {
    /// Bucket the manifest was stored in.
    pub cache_name: String,
    /// Number of manifest entries stored.
    pub cached: usize,
    /// The worker asks to activate without waiting for old clients to close.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActivationReport {
    /// The one bucket left in place.
    pub cache_name: String,
    /// Stale buckets removed.
    pub deleted: Vec<String>,
    /// Stale buckets that could not be removed.
    pub failed: Vec<String>,
    /// Clients under control after claiming.
    pub claimed: usize,
    /// Clients that received `CACHE_UPDATED`.
    pub notified: usize,
}

/// A request-intercepting cache worker.
pub struct ServiceWorker {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    router: CacheStrategyRouter,
    lifecycle: Lifecycle,
    clients: Clients,
    strategies: Strategies,
    /// Set on first activation. A re-install keeps serving the active version.
    controlling: AtomicBool,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        let offline_request = Request::navigate(config.offline_page.clone());
        let strategies = Strategies::new(
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            config.cache_name.clone(),
            offline_request,
            config.timeout,
        );
        Self {
            router: CacheStrategyRouter::new(config.tables.clone()),
            config,
            storage,
            fetcher,
            lifecycle: Lifecycle::new(),
            clients: Clients::new(),
            strategies,
            controlling: AtomicBool::new(false),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Whether fetches are being intercepted.
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::Acquire)
    }

    /// Resolve a path or URL against the worker origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.config.origin, input).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Deliver a lifecycle event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(self.handle_fetch(&request).await)),
        }
    }

    /// Install, then activate straight away if the install asked to skip waiting.
    pub async fn install_and_activate(&self) -> Result<(InstallReport, Option<ActivationReport>), Error> {
        let installed = self.install().await?;
        let activated = if installed.skip_waiting { Some(self.activate().await?) } else { None };
        Ok((installed, activated))
    }

    /// Pre-cache the manifest into the current bucket.
    ///
    /// Every manifest entry must come back with a 2xx status; otherwise
    /// nothing is stored and the install fails.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let previous = self.lifecycle.transition(LifecycleState::Installing).await?;

        match self.precache().await {
            Ok(cached) => {
                self.lifecycle.transition(LifecycleState::Installed).await?;
                tracing::info!(cache = %self.config.cache_name, cached, "install complete");
                Ok(InstallReport { cache_name: self.config.cache_name.clone(), cached, skip_waiting: true })
            }
            Err(e) => {
                let state = self.lifecycle.abort_install(previous).await;
                tracing::error!(cache = %self.config.cache_name, error = %e, state = state.as_str(), "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let bucket = &self.config.cache_name;
        self.storage.open(bucket).await?;

        let fetches = self.config.precache.iter().map(|url| async move {
            let request = Request::get(url.clone()).with_mode(RequestMode::Cors);
            let response: Response = self
                .strategies
                .network(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;
            if !response.ok() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status)));
            }
            Ok::<_, Error>((request, response))
        });
        let entries = try_join_all(fetches).await?;

        self.storage
            .put_all(bucket, &entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("storing manifest: {e}")))?;
        Ok(entries.len())
    }

    /// Drop stale buckets, claim clients and broadcast `CACHE_UPDATED`.
    ///
    /// Bucket cleanup failures are logged and reported but never stop
    /// clients from being claimed.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.lifecycle.transition(LifecycleState::Activating).await?;
        let current = self.config.cache_name.as_str();

        let stale: Vec<String> = match self.storage.bucket_names().await {
            Ok(names) => names.into_iter().filter(|name| name != current).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list cache buckets");
                Vec::new()
            }
        };

        let results = join_all(stale.iter().map(|name| self.storage.delete_bucket(name))).await;
        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    tracing::info!(bucket = %name, "deleted stale cache");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(bucket = %name, error = %e, "failed to delete stale cache");
                    failed.push(name);
                }
            }
        }

        let claimed = self.clients.claim().await;
        let message = ClientMessage::CacheUpdated { cache_name: current.to_string() };
        let notified = self.clients.post_all(&message).await;

        self.lifecycle.transition(LifecycleState::Activated).await?;
        self.controlling.store(true, Ordering::Release);

        Ok(ActivationReport { cache_name: current.to_string(), deleted, failed, claimed, notified })
    }

    /// Handle an intercepted request.
    ///
    /// Requests pass through untouched until the worker has activated, and
    /// for any method other than GET.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.is_controlling() {
            return FetchOutcome::Passthrough;
        }
        let Some(strategy) = self.router.classify(request) else {
            return FetchOutcome::Passthrough;
        };
        tracing::debug!(url = %request.url, strategy = strategy.as_str(), "routing fetch");
        self.strategies.run(strategy, request).await
    }

    /// Perform a request the worker did not intercept.
    pub async fn passthrough(&self, request: &Request) -> Result<Response, Error> {
        self.fetcher.fetch(request).await
    }

    /// Open a client. Clients opened while the worker is active start controlled.
    pub async fn connect_client(&self) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let controlled = self.is_controlling();
        self.clients.open(controlled).await
    }

    /// Wait for background cache writes to finish.
    pub async fn settle(&self) {
        self.strategies.settle().await;
    }
}
