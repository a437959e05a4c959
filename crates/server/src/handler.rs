//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    cache::{CacheKeysParams, CacheMatchParams, keys_impl, match_impl},
    client::{self, ClientParams, Inboxes},
    worker::{self, WorkerFetchParams},
};
use crate::worker::ServiceWorker;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for shell-cache.
#[derive(Clone)]
pub struct ShellCacheServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<ServiceWorker>,
    inboxes: Arc<Inboxes>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShellCacheServer {
    /// Create a new server handler around a worker.
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { tool_router: Self::tool_router(), worker, inboxes: Arc::new(Inboxes::new()) }
    }

    #[tool(
        description = "Install the worker: pre-cache the manifest into the current bucket, then activate. Fails without storing anything if any manifest entry cannot be fetched."
    )]
    async fn worker_install(&self) -> Result<CallToolResult, McpError> {
        worker::install_impl(&self.worker).await
    }

    #[tool(
        description = "Activate an installed worker: delete stale cache buckets, claim open clients and post CACHE_UPDATED to each."
    )]
    async fn worker_activate(&self) -> Result<CallToolResult, McpError> {
        worker::activate_impl(&self.worker).await
    }

    #[tool(description = "Report the worker lifecycle state, current cache name, stored buckets and open clients.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        worker::status_impl(&self.worker).await
    }

    /// Dispatch a fetch event.
    ///
    /// Requests the worker does not intercept are fetched from the network directly.
    #[tool(
        description = "Dispatch a fetch event for a URL or path. Returns the chosen strategy, where the response came from (network, cache, offline, synthesized), status, content type and body."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        worker::fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Open a simulated page client. Returns its id and whether the worker already controls it.")]
    async fn client_connect(&self) -> Result<CallToolResult, McpError> {
        client::connect_impl(&self.worker, &self.inboxes).await
    }

    #[tool(description = "Drain the messages the worker has posted to a client since the last call.")]
    async fn client_messages(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        client::messages_impl(&self.inboxes, params.0).await
    }

    #[tool(description = "Close a simulated page client.")]
    async fn client_close(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        client::close_impl(&self.worker, &self.inboxes, params.0).await
    }

    #[tool(description = "Look up a stored response by URL or path in the current (or named) cache bucket.")]
    async fn cache_match(&self, params: Parameters<CacheMatchParams>) -> Result<CallToolResult, McpError> {
        match_impl(&self.worker, params.0).await
    }

    #[tool(description = "List cache buckets and the URLs stored in the current (or named) bucket.")]
    async fn cache_keys(&self, params: Parameters<CacheKeysParams>) -> Result<CallToolResult, McpError> {
        keys_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for ShellCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shell-cache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
