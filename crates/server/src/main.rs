//! shell-cache server entry point.
//!
//! This is the main binary that boots the caching worker and exposes it as an
//! MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchClient, FetchConfig};
use shellcache_core::{AppConfig, CacheDb, CacheStorage, MemoryStorage};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;
mod worker;

use worker::{ServiceWorker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let worker_config = WorkerConfig::from_app(&config)?;

    let storage: Arc<dyn CacheStorage> = if config.uses_memory_store() {
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(CacheDb::open(&config.db_path).await?)
    };

    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        ..FetchConfig::new(worker_config.origin.clone())
    };
    let fetcher = Arc::new(FetchClient::new(fetch_config)?);

    tracing::info!(
        cache = %worker_config.cache_name,
        origin = %worker_config.origin,
        precache = worker_config.precache.len(),
        "Starting shell-cache server on stdio transport"
    );

    let worker = Arc::new(ServiceWorker::new(worker_config, storage, fetcher));
    let handler = handler::ShellCacheServer::new(Arc::clone(&worker));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    worker.settle().await;

    Ok(())
}
