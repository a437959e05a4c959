//! cache_match tool implementation.
//!
//! Looks up a stored response in the current bucket.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Error, Request, ResponseType};

use crate::tools::json_result;
use crate::worker::ServiceWorker;

/// Parameters for the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchParams {
    /// Absolute URL, or a path resolved against the worker origin.
    pub url: String,

    /// Bucket to search (default: the current cache).
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Output from the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchOutput {
    pub bucket: String,
    pub url: String,
    pub status: u16,
    pub response_type: ResponseType,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body size in bytes.
    pub size: usize,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
}

/// Implementation of the cache_match tool.
pub async fn match_impl(worker: &ServiceWorker, params: CacheMatchParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let bucket = params.bucket.unwrap_or_else(|| worker.cache_name().to_string());

    let response = worker
        .storage()
        .match_request(&bucket, &Request::get(url.clone()))
        .await?
        .ok_or_else(|| Error::CacheMiss(url.to_string()))?;

    let output = CacheMatchOutput {
        bucket,
        url: response.url.to_string(),
        status: response.status,
        response_type: response.response_type,
        content_type: response.content_type.clone(),
        size: response.body.len(),
        body: response.text(),
        headers: response.headers,
    };
    json_result(&output)
}
