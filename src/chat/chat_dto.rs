use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::chat_models::{
    Attachment, LastMessage, MessageRecord, MessageType, ParticipantRole,
};
use crate::directory::UserProfile;

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// A user id, or a doctor-profile id that resolves to its owning user.
    pub participant_id: Uuid,
    #[validate(length(max = 5000))]
    pub initial_message: Option<String>,
    pub appointment_id: Option<Uuid>,
}

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub message_type: Option<MessageType>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Envelope shared by every successful chat response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            exists: None,
            pagination: None,
        }
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl ApiResponse<()> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            exists: None,
            pagination: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let total_pages = ((total as f64) / (limit.max(1) as f64)).ceil() as u32;
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub role: ParticipantRole,
    pub email: String,
    pub phone: Option<String>,
    pub unread_count: i32,
}

impl ParticipantResponse {
    pub fn new(profile: &UserProfile, role: ParticipantRole, unread_count: i32) -> Self {
        Self {
            id: profile.id,
            full_name: profile.full_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            role,
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            unread_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub participants: Vec<ParticipantResponse>,
    pub last_message: Option<LastMessage>,
    /// Unread messages addressed to the caller.
    pub unread_count: i32,
    pub related_appointment_id: Option<Uuid>,
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<SenderInfo>,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(record: MessageRecord, sender: Option<&UserProfile>) -> Self {
        let state = record.state();
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            sender: sender.map(|profile| SenderInfo {
                id: profile.id,
                full_name: profile.full_name.clone(),
                avatar_url: profile.avatar_url.clone(),
            }),
            receiver_id: record.receiver_id,
            content: state.display_content().to_string(),
            message_type: record.message_type(),
            attachments: record.attachments.0,
            read_at: record.read_at,
            is_deleted: record.is_deleted,
            deleted_at: record.deleted_at,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}
