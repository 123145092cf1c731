//! WebSocket endpoint carrying host events to UI clients.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use super::connections::ClientHub;
use crate::app::App;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
}

/// WebSocket upgrade handler. Clients without an id get a fresh one, announced
/// in the `status` greeting.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(app): State<Arc<App>>,
) -> Response {
    let client_id = params
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let hub = app.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, client_id))
}

async fn handle_socket(socket: WebSocket, hub: Arc<ClientHub>, client_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = Uuid::new_v4();
    let mut rx = hub.connect(&client_id, connection_id);
    tracing::info!(client_id = %client_id, "WebSocket connection established");

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize host message"),
            }
        }
    });

    // The socket is push-only; incoming frames only matter for close detection.
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                tracing::info!(client_id = %client_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
            Ok(_) => {}
        }
    }

    hub.unregister(&client_id, connection_id);
    send_task.abort();
    tracing::info!(client_id = %client_id, "WebSocket connection terminated");
}
