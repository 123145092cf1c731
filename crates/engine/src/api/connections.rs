//! Connected host UI clients.
//!
//! Each client id owns one bounded channel; the WebSocket task drains it in order.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use falbridge_shared::HostMessage;

use crate::infrastructure::ports::HostEventPort;

/// Buffer size for each client's message channel.
pub const CLIENT_CHANNEL_BUFFER: usize = 256;

struct Client {
    connection_id: Uuid,
    sender: mpsc::Sender<HostMessage>,
}

/// Registry of connected clients keyed by the host's client id.
#[derive(Default)]
pub struct ClientHub {
    clients: DashMap<String, Client>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client_id`, replacing any older connection using the same id.
    pub fn register(&self, client_id: &str, connection_id: Uuid, sender: mpsc::Sender<HostMessage>) {
        let previous = self.clients.insert(
            client_id.to_string(),
            Client {
                connection_id,
                sender,
            },
        );
        if previous.is_some() {
            tracing::debug!(client_id, "Replaced existing client connection");
        }
        tracing::debug!(client_id, connection_id = %connection_id, "Client registered");
    }

    /// Open a channel for a new socket. The first queued message is the host's
    /// `status` greeting telling the client its id.
    pub fn connect(&self, client_id: &str, connection_id: Uuid) -> mpsc::Receiver<HostMessage> {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_BUFFER);
        if tx.try_send(HostMessage::status(client_id)).is_err() {
            tracing::warn!(client_id, "Could not queue status greeting");
        }
        self.register(client_id, connection_id, tx);
        rx
    }

    /// Remove `client_id` if it is still bound to `connection_id`.
    pub fn unregister(&self, client_id: &str, connection_id: Uuid) {
        let removed = self
            .clients
            .remove_if(client_id, |_, client| client.connection_id == connection_id);
        if removed.is_some() {
            tracing::debug!(client_id, connection_id = %connection_id, "Client unregistered");
        }
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl HostEventPort for ClientHub {
    async fn send(&self, client_id: &str, message: HostMessage) {
        // Clone out so no map guard is held across the await.
        let Some(sender) = self.clients.get(client_id).map(|c| c.sender.clone()) else {
            tracing::debug!(client_id, event_type = %message.event_type, "No client to notify");
            return;
        };
        if sender.send(message).await.is_err() {
            tracing::warn!(client_id, "Client channel closed, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let hub = ClientHub::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_CHANNEL_BUFFER);
        hub.register("c1", Uuid::new_v4(), tx);

        for step in 0..3 {
            hub.send("c1", HostMessage::new("progress", json!({"value": step})))
                .await;
        }

        for step in 0..3 {
            let message = rx.recv().await.expect("message");
            assert_eq!(message.data["value"], step);
        }
    }

    #[tokio::test]
    async fn new_connection_is_greeted_with_its_id() {
        let hub = ClientHub::new();
        let mut rx = hub.connect("generated-id", Uuid::new_v4());
        hub.send("generated-id", HostMessage::info("hello")).await;

        let greeting = rx.recv().await.expect("greeting");
        assert_eq!(greeting.event_type, "status");
        assert_eq!(greeting.data["sid"], "generated-id");
        assert_eq!(rx.recv().await.expect("info"), HostMessage::info("hello"));
    }

    #[tokio::test]
    async fn unknown_client_is_ignored() {
        let hub = ClientHub::new();
        hub.send("ghost", HostMessage::info("hello")).await;
        assert!(hub.is_empty());
    }

    #[test]
    fn stale_connection_does_not_unregister_newer_one() {
        let hub = ClientHub::new();
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        hub.register("c1", old, old_tx);
        hub.register("c1", new, new_tx);
        hub.unregister("c1", old);
        assert!(hub.is_connected("c1"));

        hub.unregister("c1", new);
        assert!(!hub.is_connected("c1"));
    }
}
