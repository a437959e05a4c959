//! Network fetch for the worker strategies.
//!
//! ### Contract
//! - Any HTTP status is a successful fetch; only transport failures
//!   (DNS, connect, TLS, timeout, oversized body) are errors.
//! - Responses are classified the way a browser exposes them to a worker:
//!   same-origin responses are `basic`, cross-origin responses are `cors`
//!   for CORS-mode requests and `opaque` otherwise. A same-origin request
//!   redirected to another origin counts as cross-origin.
//! - Max body bytes: 10MB (configurable)

pub mod url;

use std::time::{Duration, Instant};

use ::url::Url;
use reqwest::{Client, header};
use shellcache_core::{Error, Request, RequestMode, Response, ResponseType};

pub use self::url::{UrlError, is_same_origin, resolve};

/// Source of network responses for the caching strategies.
///
/// Implemented by [`FetchClient`] for real traffic; tests substitute scripted
/// fetchers.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request against the network.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin the worker serves; decides `basic` vs cross-origin responses.
    pub origin: Url,

    /// User agent string (default: "shell-cache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            user_agent: "shell-cache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(10_000),
            max_redirects: 5,
        }
    }
}

/// Response type a worker would observe for `request` answered from `final_url`.
pub fn response_type_for(origin: &Url, request: &Request, final_url: &Url) -> ResponseType {
    if is_same_origin(origin, &request.url) && is_same_origin(origin, final_url) {
        ResponseType::Basic
    } else if request.mode == RequestMode::Cors {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn map_reqwest_error(url: &Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

#[async_trait::async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.as_str())
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, &e))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&request.url, &e))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "fetched {} {} -> {} ({}) in {}ms ({} bytes)",
            request.method,
            request.url,
            final_url,
            status,
            fetch_ms,
            body.len()
        );

        Ok(Response {
            url: final_url.clone(),
            status,
            response_type: response_type_for(&self.config.origin, request, &final_url),
            content_type,
            headers,
            body,
        })
    }
}
