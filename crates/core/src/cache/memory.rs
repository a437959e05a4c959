//! In-memory bucket storage.
//!
//! Uses nested BTreeMaps behind a tokio RwLock. Nothing survives a restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::CacheStorage;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response};

#[derive(Debug, Clone)]
struct MemoryEntry {
    url: String,
    response: Response,
}

type Bucket = BTreeMap<String, MemoryEntry>;

/// In-memory cache storage.
///
/// Cloning shares the underlying buckets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<RwLock<BTreeMap<String, Bucket>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), Error> {
        self.buckets.write().await.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }

    async fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>, Error> {
        let key = compute_cache_key(&request.method, request.url.as_str());
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .and_then(|entries| entries.get(&key))
            .map(|entry| entry.response.clone()))
    }

    async fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<(), Error> {
        let key = compute_cache_key(&request.method, request.url.as_str());
        let entry = MemoryEntry { url: request.url.to_string(), response: response.clone() };
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key, entry);
        Ok(())
    }

    async fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        let target = buckets.entry(bucket.to_string()).or_default();
        for (request, response) in entries {
            let key = compute_cache_key(&request.method, request.url.as_str());
            target.insert(key, MemoryEntry { url: request.url.to_string(), response: response.clone() });
        }
        Ok(())
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, Error> {
        let buckets = self.buckets.read().await;
        let mut urls: Vec<String> = buckets
            .get(bucket)
            .map(|entries| entries.values().map(|e| e.url.clone()).collect())
            .unwrap_or_default();
        urls.sort();
        Ok(urls)
    }
}
