//! Worker lifecycle and fetch tools.
//!
//! `worker_install` and `worker_activate` drive lifecycle events,
//! `worker_status` reports where the worker stands and `worker_fetch`
//! dispatches a fetch event as a page would.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Destination, Error, Request, RequestMode, Response, ResponseType};

use super::json_result;
use crate::worker::{
    ActivationReport, EventOutcome, FetchOutcome, InstallReport, LifecycleState, ResponseSource, ServiceWorker,
    Strategy, WorkerEvent,
};

/// Output from the worker_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerInstallOutput {
    pub install: InstallReport,
    /// Present when the install skipped waiting and activation ran.
    pub activation: Option<ActivationReport>,
    pub state: LifecycleState,
}

pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let (install, activation) = worker.install_and_activate().await?;
    let output = WorkerInstallOutput { install, activation, state: worker.state().await };
    json_result(&output)
}

pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    match worker.dispatch(WorkerEvent::Activate).await? {
        EventOutcome::Activated(report) => json_result(&report),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(outcome: &EventOutcome) -> McpError {
    Error::InvalidState(format!("unexpected event outcome: {outcome:?}")).into()
}

/// Output from the worker_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusOutput {
    pub state: LifecycleState,
    pub cache_name: String,
    /// Whether fetch events are intercepted.
    pub controlling: bool,
    /// Every bucket currently in storage.
    pub buckets: Vec<String>,
    /// Open simulated clients.
    pub clients: usize,
}

pub async fn status_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let output = WorkerStatusOutput {
        state: worker.state().await,
        cache_name: worker.cache_name().to_string(),
        controlling: worker.is_controlling(),
        buckets: worker.storage().bucket_names().await?,
        clients: worker.clients().len().await,
    };
    json_result(&output)
}

/// Parameters for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Absolute URL, or a path resolved against the worker origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request destination, e.g. "document", "image", "script".
    #[serde(default)]
    pub destination: Option<Destination>,

    /// Request mode, e.g. "navigate", "no-cors", "cors". Defaults to
    /// "navigate" for document requests and "no-cors" otherwise.
    #[serde(default)]
    pub mode: Option<RequestMode>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    pub url: String,
    /// False when the worker let the request through to the network.
    pub intercepted: bool,
    pub strategy: Option<Strategy>,
    pub source: Option<ResponseSource>,
    /// Absent when the worker resolved without a response.
    pub status: Option<u16>,
    pub response_type: Option<ResponseType>,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl WorkerFetchOutput {
    fn new(url: String, intercepted: bool, strategy: Option<Strategy>, source: Option<ResponseSource>) -> Self {
        Self {
            url,
            intercepted,
            strategy,
            source,
            status: None,
            response_type: None,
            content_type: None,
            body: None,
        }
    }

    fn with_response(mut self, response: &Response) -> Self {
        self.status = Some(response.status);
        self.response_type = Some(response.response_type);
        self.content_type = response.content_type.clone();
        self.body = Some(response.text());
        self
    }
}

pub async fn fetch_impl(worker: &ServiceWorker, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(worker, &params)?;
    let url = request.url.to_string();

    let outcome = match worker.dispatch(WorkerEvent::Fetch(request.clone())).await? {
        EventOutcome::Fetched(outcome) => outcome,
        other => return Err(unexpected(&other)),
    };

    let output = match outcome {
        FetchOutcome::Passthrough => {
            let response = worker.passthrough(&request).await?;
            WorkerFetchOutput::new(url, false, None, None).with_response(&response)
        }
        FetchOutcome::Responded { strategy, source, response } => {
            WorkerFetchOutput::new(url, true, Some(strategy), Some(source)).with_response(&response)
        }
        FetchOutcome::NoResponse { strategy } => WorkerFetchOutput::new(url, true, Some(strategy), None),
    };
    json_result(&output)
}

fn build_request(worker: &ServiceWorker, params: &WorkerFetchParams) -> Result<Request, McpError> {
    let url = worker.resolve(&params.url)?;
    let destination = params.destination.unwrap_or_default();
    let mode = params.mode.unwrap_or(if destination == Destination::Document {
        RequestMode::Navigate
    } else {
        RequestMode::NoCors
    });
    Ok(Request::get(url)
        .with_method(&params.method)
        .with_destination(destination)
        .with_mode(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_output;
    use crate::worker::testing::TestSite;

    fn fetch_params(url: &str, destination: Option<Destination>) -> WorkerFetchParams {
        WorkerFetchParams { url: url.into(), method: default_method(), destination, mode: None }
    }

    #[tokio::test]
    async fn test_install_activates() {
        let site = TestSite::new();
        let result = install_impl(&site.worker).await.unwrap();
        let output: WorkerInstallOutput = parse_output(&result);

        assert_eq!(output.install.cached, 3);
        assert!(output.activation.is_some());
        assert_eq!(output.state, LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_install_failure_is_error() {
        let site = TestSite::new();
        site.fetcher.fail("/offline.html");

        let err = install_impl(&site.worker).await.unwrap_err();
        assert_eq!(err.code.0, -32020);
    }

    #[tokio::test]
    async fn test_activate_before_install_is_error() {
        let site = TestSite::new();
        let err = activate_impl(&site.worker).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_status() {
        let site = TestSite::active().await;
        let output: WorkerStatusOutput = parse_output(&status_impl(&site.worker).await.unwrap());

        assert_eq!(output.state, LifecycleState::Activated);
        assert!(output.controlling);
        assert_eq!(output.buckets, vec!["ict-site-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_offline_navigation() {
        let site = TestSite::active().await;
        site.fetcher.fail("/services/rmm");

        let params = fetch_params("/services/rmm", Some(Destination::Document));
        let output: WorkerFetchOutput = parse_output(&fetch_impl(&site.worker, params).await.unwrap());

        assert!(output.intercepted);
        assert_eq!(output.strategy, Some(Strategy::NetworkFirst));
        assert_eq!(output.source, Some(ResponseSource::Offline));
        assert_eq!(output.status, Some(200));
        assert_eq!(output.body.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn test_fetch_no_response() {
        let site = TestSite::active().await;
        site.fetcher.fail("/images/team.jpg");

        let params = fetch_params("/images/team.jpg", Some(Destination::Image));
        let output: WorkerFetchOutput = parse_output(&fetch_impl(&site.worker, params).await.unwrap());

        assert!(output.intercepted);
        assert_eq!(output.status, None);
    }

    #[tokio::test]
    async fn test_fetch_passthrough_uses_network() {
        let site = TestSite::new();
        site.fetcher.respond("/pricing", 200, "prices");

        let output: WorkerFetchOutput =
            parse_output(&fetch_impl(&site.worker, fetch_params("/pricing", None)).await.unwrap());
        assert!(!output.intercepted);
        assert_eq!(output.body.as_deref(), Some("prices"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_url() {
        let site = TestSite::active().await;
        let err = fetch_impl(&site.worker, fetch_params("mailto:someone@example.com", None))
            .await
            .unwrap_err();
        assert_eq!(err.code.0, -32003);
    }
}
