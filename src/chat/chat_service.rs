use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::directory::{DirectoryRepository, Principal, Role, UserProfile};
use crate::error::{AppError, Result};
use crate::websocket::types::{
    ConversationClosedPayload, ConversationReadPayload, MessageDeletedPayload, WsMessage,
};
use crate::websocket::ConnectionManager;

use super::chat_dto::{
    ConversationResponse, CreateConversationRequest, MessageResponse, ParticipantResponse,
    SendMessageRequest,
};
use super::chat_models::{
    Conversation, DeleteOutcome, NewConversation, NewMessage, ParticipantRole,
};
use super::chat_repository::ChatRepository;
use super::eligibility::{check_eligibility, requires_appointment, Eligibility};

const CONVERSATION_NOT_FOUND: &str = "Không tìm thấy cuộc trò chuyện";

#[derive(Clone)]
pub struct ChatService {
    repo: Arc<dyn ChatRepository>,
    directory: Arc<dyn DirectoryRepository>,
    ws_manager: ConnectionManager,
}

impl ChatService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        directory: Arc<dyn DirectoryRepository>,
        ws_manager: ConnectionManager,
    ) -> Self {
        Self {
            repo,
            directory,
            ws_manager,
        }
    }

    /// Returns the active conversation between the caller and the target,
    /// creating it when the pair is eligible. The flag is `true` when the
    /// conversation already existed.
    pub async fn get_or_create_conversation(
        &self,
        principal: Principal,
        payload: CreateConversationRequest,
    ) -> Result<(ConversationResponse, bool)> {
        payload.validate()?;

        let target = self.resolve_participant(payload.participant_id).await?;
        if target.id == principal.id {
            return Err(AppError::BadRequest(
                "Không thể tạo cuộc trò chuyện với chính mình".to_string(),
            ));
        }

        if let Some(existing) = self.repo.find_active_between(principal.id, target.id).await? {
            let response = self.conversation_response(existing, Some(principal.id)).await?;
            return Ok((response, true));
        }

        let target_role = target.role();
        let related_appointment_id = self
            .authorizing_appointment(principal, target.id, target_role, payload.appointment_id)
            .await?;

        let has_appointment = related_appointment_id.is_some();
        if let Eligibility::Deny(reason) =
            check_eligibility(principal.role, target_role, has_appointment)
        {
            tracing::debug!(
                "Conversation denied between {} ({}) and {} ({}): {:?}",
                principal.id,
                principal.role,
                target.id,
                target_role,
                reason
            );
            return Err(AppError::Forbidden(reason.message().to_string()));
        }

        let initial_message = payload
            .initial_message
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string);

        let new = NewConversation {
            participants: [
                (principal.id, ParticipantRole::from(principal.role)),
                (target.id, ParticipantRole::from(target_role)),
            ],
            related_appointment_id,
            initial_message,
        };

        let (conversation, exists) = match self.repo.create_conversation(new).await? {
            Some(created) => (created, false),
            None => {
                let existing = self
                    .repo
                    .find_active_between(principal.id, target.id)
                    .await?
                    .ok_or(AppError::InternalError)?;
                (existing, true)
            }
        };

        if !exists {
            tracing::info!(
                "Conversation {} opened between {} and {}",
                conversation.id,
                principal.id,
                target.id
            );
            let for_target = self
                .conversation_response(conversation.clone(), Some(target.id))
                .await?;
            self.ws_manager
                .send_to_user(&target.id, WsMessage::ConversationCreated(for_target));
        }

        let response = self.conversation_response(conversation, Some(principal.id)).await?;
        Ok((response, exists))
    }

    pub async fn list_conversations(
        &self,
        principal: Principal,
    ) -> Result<Vec<ConversationResponse>> {
        let conversations = self.repo.list_for_participant(principal.id).await?;
        self.conversation_responses(conversations, Some(principal.id))
            .await
    }

    pub async fn list_all_conversations(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationResponse>, i64)> {
        let (conversations, total) = self.repo.list_active(limit, offset).await?;
        let responses = self.conversation_responses(conversations, None).await?;
        Ok((responses, total))
    }

    pub async fn send_message(
        &self,
        principal: Principal,
        conversation_id: Uuid,
        payload: SendMessageRequest,
    ) -> Result<MessageResponse> {
        let content = payload.content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest(
                "Nội dung tin nhắn không được để trống".to_string(),
            ));
        }
        payload.validate()?;

        let conversation = self.require_membership(conversation_id, principal.id).await?;
        let receiver_id = conversation
            .counterpart(principal.id)
            .ok_or_else(|| AppError::NotFound(CONVERSATION_NOT_FOUND.to_string()))?;

        let new = NewMessage {
            conversation_id,
            sender_id: principal.id,
            receiver_id,
            content: content.to_string(),
            message_type: payload.message_type.unwrap_or_default(),
            attachments: payload.attachments,
        };

        let message = self
            .repo
            .append_message(new)
            .await?
            .ok_or_else(|| AppError::NotFound(CONVERSATION_NOT_FOUND.to_string()))?;

        tracing::debug!(
            "Message {} appended to conversation {} (receiver online: {})",
            message.id,
            conversation_id,
            self.ws_manager.is_online(&receiver_id)
        );

        let sender = self.directory.find_user(principal.id).await?;
        let response = MessageResponse::new(message, sender.as_ref());

        self.ws_manager
            .send_to_user(&receiver_id, WsMessage::NewMessage(response.clone()));
        self.ws_manager
            .send_to_user(&principal.id, WsMessage::NewMessage(response.clone()));

        Ok(response)
    }

    /// Chronological page of messages. Opening any page marks every message
    /// addressed to the caller in this conversation as read.
    pub async fn get_messages(
        &self,
        principal: Principal,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageResponse>, i64)> {
        let conversation = self.require_membership(conversation_id, principal.id).await?;

        let marked = self
            .repo
            .mark_conversation_read(conversation_id, principal.id)
            .await?;

        if marked > 0 {
            if let Some(other) = conversation.counterpart(principal.id) {
                self.ws_manager.send_to_user(
                    &other,
                    WsMessage::ConversationRead(ConversationReadPayload {
                        conversation_id,
                        reader_id: principal.id,
                    }),
                );
            }
        }

        let (mut messages, total) = self
            .repo
            .find_messages_page(conversation_id, limit, offset)
            .await?;
        messages.reverse();

        let sender_ids: Vec<Uuid> = unique(messages.iter().map(|m| m.sender_id));
        let senders = self.profiles_by_id(&sender_ids).await?;

        let responses = messages
            .into_iter()
            .map(|message| {
                let sender = senders.get(&message.sender_id);
                MessageResponse::new(message, sender)
            })
            .collect();

        Ok((responses, total))
    }

    pub async fn delete_message(
        &self,
        principal: Principal,
        message_id: Uuid,
    ) -> Result<DeleteOutcome> {
        let message = self
            .repo
            .find_message(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Không tìm thấy tin nhắn".to_string()))?;

        if message.sender_id != principal.id {
            return Err(AppError::Forbidden(
                "Bạn chỉ có thể xóa tin nhắn của chính mình".to_string(),
            ));
        }

        if message.is_deleted {
            return Ok(DeleteOutcome::AlreadyDeleted);
        }

        let outcome = self
            .repo
            .soft_delete_message(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Không tìm thấy tin nhắn".to_string()))?;

        if let DeleteOutcome::Deleted(deleted) = &outcome {
            tracing::debug!(
                "Message {} retracted in conversation {}",
                deleted.id,
                deleted.conversation_id
            );
            let event = WsMessage::MessageDeleted(MessageDeletedPayload {
                conversation_id: deleted.conversation_id,
                message_id: deleted.id,
            });
            self.ws_manager.send_to_user(&deleted.receiver_id, event.clone());
            self.ws_manager.send_to_user(&deleted.sender_id, event);
        }

        Ok(outcome)
    }

    pub async fn close_conversation(
        &self,
        principal: Principal,
        conversation_id: Uuid,
    ) -> Result<()> {
        let conversation = self.require_membership(conversation_id, principal.id).await?;

        if !self.repo.close_conversation(conversation_id).await? {
            return Err(AppError::NotFound(CONVERSATION_NOT_FOUND.to_string()));
        }

        tracing::info!(
            "Conversation {} closed by {}",
            conversation_id,
            principal.id
        );

        if let Some(other) = conversation.counterpart(principal.id) {
            self.ws_manager.send_to_user(
                &other,
                WsMessage::ConversationClosed(ConversationClosedPayload {
                    conversation_id,
                    closed_by: principal.id,
                }),
            );
        }

        Ok(())
    }

    /// Recomputed from the messages themselves rather than the cached counters.
    pub async fn unread_count(&self, principal: Principal) -> Result<i64> {
        self.repo.count_unread_total(principal.id).await
    }

    /// The other participant of an active conversation the user belongs to.
    pub async fn counterpart(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Uuid> {
        let conversation = self.require_membership(conversation_id, user_id).await?;
        conversation
            .counterpart(user_id)
            .ok_or_else(|| AppError::NotFound(CONVERSATION_NOT_FOUND.to_string()))
    }

    /// Non-members get the same answer as for a missing conversation.
    async fn require_membership(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation> {
        match self.repo.find_conversation(conversation_id).await? {
            Some(conversation)
                if conversation.is_active && conversation.has_participant(user_id) =>
            {
                Ok(conversation)
            }
            _ => Err(AppError::NotFound(CONVERSATION_NOT_FOUND.to_string())),
        }
    }

    /// The id may name a user directly or a doctor profile owned by a user.
    async fn resolve_participant(&self, participant_id: Uuid) -> Result<UserProfile> {
        let user = match self.directory.find_user(participant_id).await? {
            Some(user) => Some(user),
            None => match self.directory.find_doctor_owner(participant_id).await? {
                Some(owner_id) => self.directory.find_user(owner_id).await?,
                None => None,
            },
        };

        user.filter(|user| user.is_active)
            .ok_or_else(|| AppError::NotFound("Không tìm thấy người dùng".to_string()))
    }

    /// Appointment that binds the new conversation: the one named by the
    /// client if it belongs to the pair, otherwise the most recent
    /// chat-eligible appointment between patient and doctor.
    async fn authorizing_appointment(
        &self,
        principal: Principal,
        target_id: Uuid,
        target_role: Role,
        requested: Option<Uuid>,
    ) -> Result<Option<Uuid>> {
        if let Some(appointment_id) = requested {
            let appointment = self
                .directory
                .find_appointment(appointment_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Không tìm thấy lịch hẹn".to_string()))?;

            if !appointment.involves(principal.id, target_id) {
                return Err(AppError::Forbidden(
                    "Lịch hẹn không thuộc về hai người tham gia".to_string(),
                ));
            }

            let allows_chat = appointment.status().is_some_and(|s| s.allows_chat());
            if allows_chat || !requires_appointment(principal.role, target_role) {
                return Ok(Some(appointment.id));
            }
        }

        if !requires_appointment(principal.role, target_role) {
            return Ok(None);
        }

        let (patient_id, doctor_user_id) = if principal.role == Role::User {
            (principal.id, target_id)
        } else {
            (target_id, principal.id)
        };

        let appointment = self
            .directory
            .find_chat_appointment(patient_id, doctor_user_id)
            .await?;

        Ok(appointment.map(|a| a.id))
    }

    async fn conversation_response(
        &self,
        conversation: Conversation,
        viewer: Option<Uuid>,
    ) -> Result<ConversationResponse> {
        self.conversation_responses(vec![conversation], viewer)
            .await?
            .pop()
            .ok_or(AppError::InternalError)
    }

    async fn conversation_responses(
        &self,
        conversations: Vec<Conversation>,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ConversationResponse>> {
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let participants = self.repo.find_participants(&ids).await?;

        let user_ids = unique(participants.iter().map(|p| p.user_id));
        let profiles = self.profiles_by_id(&user_ids).await?;

        let responses = conversations
            .into_iter()
            .map(|conversation| {
                let members: Vec<_> = participants
                    .iter()
                    .filter(|p| p.conversation_id == conversation.id)
                    .collect();

                let unread_count = viewer
                    .and_then(|viewer| members.iter().find(|p| p.user_id == viewer))
                    .map(|p| p.unread_count)
                    .unwrap_or(0);

                let participants = members
                    .iter()
                    .filter_map(|p| {
                        profiles.get(&p.user_id).map(|profile| {
                            ParticipantResponse::new(profile, p.role(), p.unread_count)
                        })
                    })
                    .collect();

                ConversationResponse {
                    id: conversation.id,
                    participants,
                    last_message: conversation.last_message(),
                    unread_count,
                    related_appointment_id: conversation.related_appointment_id,
                    is_active: conversation.is_active,
                    last_activity: conversation.last_activity,
                    created_at: conversation.created_at,
                }
            })
            .collect();

        Ok(responses)
    }

    async fn profiles_by_id(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        let profiles = self.directory.find_users(ids).await?;
        Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
    }
}

fn unique(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}
