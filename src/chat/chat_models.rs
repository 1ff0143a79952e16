use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::directory::Role;

/// Content written over a message when its sender retracts it.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "Tin nhắn đã bị xóa";

/// Role a participant held when the conversation was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Patient,
    Doctor,
    Admin,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Patient => "patient",
            ParticipantRole::Doctor => "doctor",
            ParticipantRole::Admin => "admin",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "doctor" => ParticipantRole::Doctor,
            "admin" => ParticipantRole::Admin,
            _ => ParticipantRole::Patient,
        }
    }
}

impl From<Role> for ParticipantRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ParticipantRole::Patient,
            Role::Doctor => ParticipantRole::Doctor,
            Role::Admin => ParticipantRole::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Video,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Audio => "audio",
            MessageType::Video => "video",
            MessageType::System => "system",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "image" => MessageType::Image,
            "file" => MessageType::File,
            "audio" => MessageType::Audio,
            "video" => MessageType::Video,
            "system" => MessageType::System,
            _ => MessageType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub file_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_low: Uuid,
    pub participant_high: Uuid,
    pub related_appointment_id: Option<Uuid>,
    pub is_active: bool,
    pub last_message_id: Option<Uuid>,
    pub last_message_content: Option<String>,
    pub last_message_sender_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_low == user_id || self.participant_high == user_id
    }

    /// The other side of a two-party conversation.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_low == user_id {
            Some(self.participant_high)
        } else if self.participant_high == user_id {
            Some(self.participant_low)
        } else {
            None
        }
    }

    pub fn last_message(&self) -> Option<LastMessage> {
        match (
            &self.last_message_content,
            self.last_message_sender_id,
            self.last_message_at,
        ) {
            (Some(content), Some(sender_id), Some(timestamp)) => Some(LastMessage {
                content: content.clone(),
                sender_id,
                timestamp,
            }),
            _ => None,
        }
    }
}

/// Orders a participant pair the way the `conversations` table stores it.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub unread_count: i32,
    pub joined_at: DateTime<Utc>,
}

impl ConversationParticipant {
    pub fn role(&self) -> ParticipantRole {
        ParticipantRole::from_db(&self.role)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub attachments: Json<Vec<Attachment>>,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a stored message currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageState {
    Active { content: String },
    Deleted { deleted_at: DateTime<Utc> },
}

impl MessageState {
    pub fn display_content(&self) -> &str {
        match self {
            MessageState::Active { content } => content,
            MessageState::Deleted { .. } => DELETED_MESSAGE_PLACEHOLDER,
        }
    }
}

impl MessageRecord {
    pub fn state(&self) -> MessageState {
        if self.is_deleted {
            MessageState::Deleted {
                deleted_at: self.deleted_at.unwrap_or(self.updated_at),
            }
        } else {
            MessageState::Active {
                content: self.content.clone(),
            }
        }
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_db(&self.message_type)
    }
}

/// A conversation about to be inserted, with its participant snapshot.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub participants: [(Uuid, ParticipantRole); 2],
    pub related_appointment_id: Option<Uuid>,
    pub initial_message: Option<String>,
}

/// A message about to be appended to an existing conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted(MessageRecord),
    AlreadyDeleted,
}
