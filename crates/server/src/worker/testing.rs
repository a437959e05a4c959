//! Scripted network and a small demo site for worker tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shellcache_client::Fetcher;
use shellcache_core::{CacheStorage, Error, MemoryStorage, Request, Response, ResponseType};
use url::Url;

use super::{FetchOutcome, ServiceWorker, StrategyTables, WorkerConfig};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Response),
    Fail,
    Hang,
}

/// A `Fetcher` that answers from a script and counts calls per URL.
///
/// Unscripted URLs fail like an unreachable host.
#[derive(Debug)]
pub(crate) struct ScriptedFetcher {
    origin: Url,
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(origin: &Url) -> Self {
        Self { origin: origin.clone(), script: Mutex::new(HashMap::new()), calls: Mutex::new(HashMap::new()) }
    }

    /// Script the three manifest entries of [`TestSite`].
    pub(crate) fn for_site(origin: &Url) -> Self {
        let fetcher = Self::new(origin);
        fetcher.respond("/", 200, "shell");
        fetcher.respond("/offline.html", 200, "offline");
        fetcher.respond("/logo.png", 200, "logo");
        fetcher
    }

    fn key(&self, target: &str) -> String {
        self.origin.join(target).map(|u| u.to_string()).unwrap_or_else(|_| target.to_string())
    }

    fn set(&self, target: &str, scripted: Scripted) {
        let key = self.key(target);
        self.script.lock().unwrap().insert(key, scripted);
    }

    pub(crate) fn respond(&self, target: &str, status: u16, body: &'static str) {
        let url = Url::parse(&self.key(target)).unwrap();
        self.set(target, Scripted::Respond(Response::new(url, status, ResponseType::Basic, body)));
    }

    pub(crate) fn respond_with(&self, target: &str, response: Response) {
        self.set(target, Scripted::Respond(response));
    }

    pub(crate) fn fail(&self, target: &str) {
        self.set(target, Scripted::Fail);
    }

    pub(crate) fn hang(&self, target: &str) {
        self.set(target, Scripted::Hang);
    }

    pub(crate) fn calls(&self, target: &str) -> usize {
        let key = self.key(target);
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let key = request.url.to_string();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        let scripted = self.script.lock().unwrap().get(&key).cloned();

        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Network(format!("{key}: hung")))
            }
            Some(Scripted::Fail) | None => Err(Error::Network(format!("{key}: connection refused"))),
        }
    }
}

/// In-memory storage with injectable delete and write failures.
#[derive(Debug, Default)]
pub(crate) struct FlakyStorage {
    pub(crate) inner: MemoryStorage,
    undeletable: Mutex<HashSet<String>>,
    fail_puts: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_delete(&self, bucket: &str) {
        self.undeletable.lock().unwrap().insert(bucket.to_string());
    }

    pub(crate) fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    fn write_error(&self, bucket: &str) -> Result<(), Error> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::CorruptEntry(format!("{bucket}: write rejected")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, bucket: &str) -> Result<(), Error> {
        self.inner.open(bucket).await
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.inner.bucket_names().await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error> {
        if self.undeletable.lock().unwrap().contains(bucket) {
            return Err(Error::CorruptEntry(format!("{bucket}: locked")));
        }
        self.inner.delete_bucket(bucket).await
    }

    async fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>, Error> {
        self.inner.match_request(bucket, request).await
    }

    async fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<(), Error> {
        self.write_error(bucket)?;
        self.inner.put(bucket, request, response).await
    }

    async fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<(), Error> {
        self.write_error(bucket)?;
        self.inner.put_all(bucket, entries).await
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, Error> {
        self.inner.keys(bucket).await
    }
}

/// A worker for `https://ict.example.com` over in-memory storage.
pub(crate) struct TestSite {
    pub(crate) worker: ServiceWorker,
    pub(crate) storage: Arc<MemoryStorage>,
    pub(crate) fetcher: Arc<ScriptedFetcher>,
}

impl TestSite {
    pub(crate) fn origin() -> Url {
        Url::parse("https://ict.example.com").unwrap()
    }

    pub(crate) fn config(timeout: Duration) -> WorkerConfig {
        let origin = Self::origin();
        let defaults = shellcache_core::AppConfig::default();
        WorkerConfig {
            cache_name: "ict-site-v1".into(),
            offline_page: origin.join("/offline.html").unwrap(),
            precache: ["/", "/offline.html", "/logo.png"].iter().map(|p| origin.join(p).unwrap()).collect(),
            tables: StrategyTables::from(&defaults),
            origin,
            timeout,
        }
    }

    pub(crate) fn new() -> Self {
        Self::build(Duration::from_secs(5))
    }

    fn build(timeout: Duration) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(ScriptedFetcher::for_site(&Self::origin()));
        let worker = ServiceWorker::new(Self::config(timeout), storage.clone(), fetcher.clone());
        Self { worker, storage, fetcher }
    }

    /// Installed and activated.
    pub(crate) async fn active() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    pub(crate) async fn with_timeout(timeout: Duration) -> Self {
        let site = Self::build(timeout);
        site.worker.install_and_activate().await.unwrap();
        site
    }

    pub(crate) fn url(&self, path: &str) -> Url {
        Self::origin().join(path).unwrap()
    }
}

pub(crate) fn body_of(outcome: &FetchOutcome) -> String {
    outcome.response().map(|r| r.text()).unwrap_or_default()
}
