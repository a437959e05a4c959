//! Simulated page clients.
//!
//! The host keeps the receiving end of every client channel in an
//! [`Inboxes`] map so messages can be drained by later tool calls.

use std::collections::HashMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::Error;
use tokio::sync::{Mutex, mpsc};

use super::json_result;
use crate::worker::{ClientId, ClientMessage, ServiceWorker};

/// Receivers for clients opened through `client_connect`.
#[derive(Debug, Default)]
pub struct Inboxes {
    receivers: Mutex<HashMap<ClientId, mpsc::UnboundedReceiver<ClientMessage>>>,
}

impl Inboxes {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Output from the client_connect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientConnectOutput {
    pub client_id: ClientId,
    /// Whether the worker controls the new client from the start.
    pub controlled: bool,
}

pub async fn connect_impl(worker: &ServiceWorker, inboxes: &Inboxes) -> Result<CallToolResult, McpError> {
    let (client_id, receiver) = worker.connect_client().await;
    inboxes.receivers.lock().await.insert(client_id, receiver);

    let controlled = worker.clients().is_controlled(client_id).await.unwrap_or(false);
    json_result(&ClientConnectOutput { client_id, controlled })
}

/// Parameters for the client_messages and client_close tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientParams {
    /// Id returned by client_connect.
    pub client_id: ClientId,
}

/// Output from the client_messages tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientMessagesOutput {
    pub client_id: ClientId,
    pub messages: Vec<ClientMessage>,
}

/// Drain every message posted to a client since the last call.
pub async fn messages_impl(inboxes: &Inboxes, params: ClientParams) -> Result<CallToolResult, McpError> {
    let mut receivers = inboxes.receivers.lock().await;
    let receiver = receivers
        .get_mut(&params.client_id)
        .ok_or_else(|| Error::InvalidInput(format!("unknown client {}", params.client_id)))?;

    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    json_result(&ClientMessagesOutput { client_id: params.client_id, messages })
}

/// Output from the client_close tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientCloseOutput {
    pub closed: bool,
}

pub async fn close_impl(
    worker: &ServiceWorker, inboxes: &Inboxes, params: ClientParams,
) -> Result<CallToolResult, McpError> {
    inboxes.receivers.lock().await.remove(&params.client_id);
    let closed = worker.clients().close(params.client_id).await;
    json_result(&ClientCloseOutput { closed })
}
