use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::chat_dto::{ConversationResponse, MessageResponse};

/// Server-to-client push events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    NewMessage(MessageResponse),
    MessageDeleted(MessageDeletedPayload),
    ConversationCreated(ConversationResponse),
    ConversationRead(ConversationReadPayload),
    ConversationClosed(ConversationClosedPayload),
    TypingIndicator(TypingIndicatorPayload),
    Error(ErrorPayload),
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeletedPayload {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationReadPayload {
    pub conversation_id: Uuid,
    pub reader_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationClosedPayload {
    pub conversation_id: Uuid,
    pub closed_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingIndicatorPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TypingIndicator {
        conversation_id: Uuid,
        is_typing: bool,
    },
    Ping,
}
