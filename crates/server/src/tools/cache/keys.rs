//! cache_keys tool implementation.
//!
//! Lists buckets and the URLs stored in one of them.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use crate::worker::ServiceWorker;

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Bucket to list (default: the current cache).
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Output from the cache_keys tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysOutput {
    /// Every bucket in storage.
    pub buckets: Vec<String>,
    /// The bucket whose keys are listed.
    pub bucket: String,
    /// Stored request URLs, sorted.
    pub urls: Vec<String>,
}

/// Implementation of the cache_keys tool.
pub async fn keys_impl(worker: &ServiceWorker, params: CacheKeysParams) -> Result<CallToolResult, McpError> {
    let storage = worker.storage();
    let bucket = params.bucket.unwrap_or_else(|| worker.cache_name().to_string());

    let output = CacheKeysOutput { buckets: storage.bucket_names().await?, urls: storage.keys(&bucket).await?, bucket };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_output;
    use crate::worker::testing::TestSite;

    #[tokio::test]
    async fn test_keys_before_install() {
        let site = TestSite::new();
        let output: CacheKeysOutput = parse_output(&keys_impl(&site.worker, CacheKeysParams::default()).await.unwrap());
        assert!(output.buckets.is_empty());
        assert!(output.urls.is_empty());
    }

    #[tokio::test]
    async fn test_keys_after_install() {
        let site = TestSite::active().await;
        let output: CacheKeysOutput = parse_output(&keys_impl(&site.worker, CacheKeysParams::default()).await.unwrap());

        assert_eq!(output.buckets, vec!["ict-site-v1".to_string()]);
        assert_eq!(
            output.urls,
            vec![
                "https://ict.example.com/".to_string(),
                "https://ict.example.com/logo.png".to_string(),
                "https://ict.example.com/offline.html".to_string(),
            ]
        );
    }
}
