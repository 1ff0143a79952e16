use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ClientMessage, ErrorPayload, TypingIndicatorPayload, WsMessage},
};

use super::connection::WsSender;

/// Push channel for chat events.
///
/// Browsers cannot set headers on the upgrade request, so the token may also
/// be passed as `?token=`.
#[utoipa::path(
    get,
    path = "/api/ws",
    params(("token" = Option<String>, Query, description = "JWT when no Authorization header is sent")),
    responses(
        (status = 101, description = "Switching to WebSocket"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "realtime"
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, principal.id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let connection_id = state.ws_connections.add_connection(user_id, tx.clone());
    tracing::debug!("Push socket {} opened for user {}", connection_id, user_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let state_clone = state.clone();
    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) =
                        process_client_message(&text, user_id, &state_clone, &tx_clone).await
                    {
                        tracing::warn!("Rejected push message from {}: {}", user_id, e);
                        let _ = tx_clone.send(WsMessage::Error(ErrorPayload {
                            message: e.to_string(),
                        }));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let tx_heartbeat = tx.clone();
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            if tx_heartbeat.send(WsMessage::Ping).is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut heartbeat_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state
        .ws_connections
        .remove_connection(&user_id, &connection_id);

    tracing::info!("Push socket {} closed for user {}", connection_id, user_id);
}

async fn process_client_message(
    text: &str,
    user_id: Uuid,
    state: &AppState,
    tx: &WsSender,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Tin nhắn không hợp lệ: {}", e)))?;

    match client_msg {
        ClientMessage::TypingIndicator {
            conversation_id,
            is_typing,
        } => {
            let other = state
                .chat_service
                .counterpart(conversation_id, user_id)
                .await?;
            state.ws_connections.send_to_user(
                &other,
                WsMessage::TypingIndicator(TypingIndicatorPayload {
                    conversation_id,
                    user_id,
                    is_typing,
                }),
            );
        }
        ClientMessage::Ping => {
            let _ = tx.send(WsMessage::Pong);
        }
    }

    Ok(())
}
