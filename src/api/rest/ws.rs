use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::models::user::UserId;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Only stream messages for this recipient; all messages when absent.
    pub user_id: Option<UserId>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, recipient: Option<UserId>) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = BroadcastStream::new(state.outbound_tx.subscribe());

    info!(recipient = ?recipient, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(item) = outbound.next().await {
            let message = match item {
                Ok(message) => message,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged; messages dropped");
                    continue;
                }
            };

            if recipient.is_some_and(|id| id != message.recipient) {
                continue;
            }

            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(recipient = ?recipient, "websocket client disconnected");
}
