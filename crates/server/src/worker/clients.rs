//! Open tabs and the messages posted to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

pub type ClientId = u64;

/// Messages posted from the worker to controlled clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Sent once per activation so pages can offer a reload.
    CacheUpdated {
        #[serde(rename = "cacheName")]
        cache_name: String,
    },
}

#[derive(Debug)]
struct ClientHandle {
    sender: mpsc::UnboundedSender<ClientMessage>,
    controlled: bool,
}

/// Registry of open clients.
#[derive(Debug, Default)]
pub struct Clients {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return the receiving end of its message channel.
    pub async fn open(&self, controlled: bool) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.clients
            .write()
            .await
            .insert(id, ClientHandle { sender, controlled });
        tracing::debug!(client = id, controlled, "client opened");
        (id, receiver)
    }

    pub async fn close(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    pub async fn is_controlled(&self, id: ClientId) -> Option<bool> {
        self.clients.read().await.get(&id).map(|c| c.controlled)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Take control of every open client. Returns how many are controlled.
    pub async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        for handle in clients.values_mut() {
            handle.controlled = true;
        }
        clients.len()
    }

    /// Post `message` to every controlled client.
    ///
    /// Clients whose receiver is gone are dropped from the registry.
    /// Returns the number of clients the message was delivered to.
    pub async fn post_all(&self, message: &ClientMessage) -> usize {
        let mut clients = self.clients.write().await;
        let mut delivered = 0;
        clients.retain(|id, handle| {
            if !handle.controlled {
                return true;
            }
            match handle.sender.send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(client = id, "client gone, removing");
                    false
                }
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updated() -> ClientMessage {
        ClientMessage::CacheUpdated { cache_name: "ict-site-v2".into() }
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(updated()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "CACHE_UPDATED", "cacheName": "ict-site-v2" }));
    }

    #[tokio::test]
    async fn test_claim_then_post() {
        let clients = Clients::new();
        let (a, mut rx_a) = clients.open(false).await;
        let (_b, mut rx_b) = clients.open(false).await;

        assert_eq!(clients.post_all(&updated()).await, 0);
        assert!(rx_a.try_recv().is_err());

        assert_eq!(clients.claim().await, 2);
        assert_eq!(clients.is_controlled(a).await, Some(true));
        assert_eq!(clients.post_all(&updated()).await, 2);
        assert_eq!(rx_a.try_recv().unwrap(), updated());
        assert_eq!(rx_b.try_recv().unwrap(), updated());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let clients = Clients::new();
        let (_a, rx_a) = clients.open(true).await;
        let (_b, _rx_b) = clients.open(true).await;
        drop(rx_a);

        assert_eq!(clients.post_all(&updated()).await, 1);
        assert_eq!(clients.len().await, 1);
    }

    #[tokio::test]
    async fn test_close() {
        let clients = Clients::new();
        let (id, _rx) = clients.open(true).await;
        assert!(clients.close(id).await);
        assert!(!clients.close(id).await);
        assert_eq!(clients.is_controlled(id).await, None);
    }
}
