use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use uuid::Uuid;

use crate::{
    error::Result,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::AuthUser,
    state::AppState,
};

use super::{
    chat_dto::{
        ApiResponse, ConversationResponse, CreateConversationRequest, MessageResponse, PageQuery,
        Pagination, SendMessageRequest, UnreadCountResponse,
    },
    chat_models::DeleteOutcome,
};

/// Open a conversation, or return the active one for this pair
#[utoipa::path(
    post,
    path = "/api/chat/conversations",
    tag = "chat",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = ConversationResponse),
        (status = 200, description = "Active conversation already exists", body = ConversationResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Pair may not chat"),
        (status = 404, description = "Participant not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiJson(payload): ApiJson<CreateConversationRequest>,
) -> Result<impl IntoResponse> {
    let (conversation, exists) = state
        .chat_service
        .get_or_create_conversation(principal, payload)
        .await?;

    let status = if exists {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(ApiResponse::data(conversation).with_exists(exists)),
    ))
}

/// Active conversations of the caller, most recent activity first
#[utoipa::path(
    get,
    path = "/api/chat/conversations",
    tag = "chat",
    responses(
        (status = 200, description = "Conversations", body = Vec<ConversationResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<ApiResponse<Vec<ConversationResponse>>>> {
    let conversations = state.chat_service.list_conversations(principal).await?;
    Ok(Json(ApiResponse::data(conversations)))
}

/// Page of messages, oldest first; marks the conversation read for the caller
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{id}/messages",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Items per page (default: 50)")
    ),
    responses(
        (status = 200, description = "Messages", body = Vec<MessageResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(conversation_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ApiResponse<Vec<MessageResponse>>>> {
    let (page, limit, offset) = state.config.page_window(query.page, query.limit);

    let (messages, total) = state
        .chat_service
        .get_messages(principal, conversation_id, limit as i64, offset)
        .await?;

    Ok(Json(
        ApiResponse::data(messages).with_pagination(Pagination::new(page, limit, total)),
    ))
}

/// Send a message in a conversation
#[utoipa::path(
    post,
    path = "/api/chat/conversations/{id}/messages",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(conversation_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state
        .chat_service
        .send_message(principal, conversation_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::data(message))))
}

/// Close a conversation
#[utoipa::path(
    delete,
    path = "/api/chat/conversations/{id}",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation closed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn close_conversation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(conversation_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .chat_service
        .close_conversation(principal, conversation_id)
        .await?;

    Ok(Json(ApiResponse::ok("Đã đóng cuộc trò chuyện")))
}

/// Retract one of the caller's own messages
#[utoipa::path(
    delete,
    path = "/api/chat/messages/{id}",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message deleted, or already deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the sender"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ApiPath(message_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>> {
    let message = match state.chat_service.delete_message(principal, message_id).await? {
        DeleteOutcome::Deleted(_) => "Đã xóa tin nhắn",
        DeleteOutcome::AlreadyDeleted => "Tin nhắn đã được xóa trước đó",
    };

    Ok(Json(ApiResponse::ok(message)))
}

/// Unread messages addressed to the caller across active conversations
#[utoipa::path(
    get,
    path = "/api/chat/unread-count",
    tag = "chat",
    responses(
        (status = 200, description = "Unread total", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<ApiResponse<UnreadCountResponse>>> {
    let unread_count = state.chat_service.unread_count(principal).await?;
    Ok(Json(ApiResponse::data(UnreadCountResponse { unread_count })))
}

/// All active conversations, for moderation
#[utoipa::path(
    get,
    path = "/api/admin/conversations",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Items per page (default: 50)")
    ),
    responses(
        (status = 200, description = "Active conversations", body = Vec<ConversationResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn admin_get_conversations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ApiResponse<Vec<ConversationResponse>>>> {
    let (page, limit, offset) = state.config.page_window(query.page, query.limit);

    let (conversations, total) = state
        .chat_service
        .list_all_conversations(limit as i64, offset)
        .await?;

    Ok(Json(
        ApiResponse::data(conversations).with_pagination(Pagination::new(page, limit, total)),
    ))
}
