//! In-memory repositories and app wiring for tests.
//!
//! One mutex guards the whole store, so every repository call is atomic the
//! same way the Postgres implementation serializes on the conversation row.

use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::jwt::create_jwt;
use crate::chat::chat_models::{
    ordered_pair, Conversation, ConversationParticipant, DeleteOutcome, MessageRecord,
    NewConversation, NewMessage, DELETED_MESSAGE_PLACEHOLDER,
};
use crate::chat::chat_repository::ChatRepository;
use crate::chat::ChatService;
use crate::directory::directory_models::{Appointment, AppointmentStatus};
use crate::directory::{DirectoryRepository, Principal, Role, UserProfile};
use crate::error::Result;
use crate::state::{AppState, Config};
use crate::stats::stats_models::{BucketCount, Collection, OverviewStats, Period, StatusCount};
use crate::stats::stats_repository::StatsRepository;
use crate::stats::StatsService;
use crate::websocket::ConnectionManager;

pub const TEST_JWT_SECRET: &str = "test-secret";

#[derive(Default)]
struct Tables {
    users: Vec<UserProfile>,
    doctors: HashMap<Uuid, Uuid>,
    appointments: Vec<Appointment>,
    conversations: Vec<Conversation>,
    participants: Vec<ConversationParticipant>,
    messages: Vec<MessageRecord>,
    clock: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing timestamps so ordering by time is deterministic.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn conversation_mut(&mut self, id: Uuid) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn participant_mut(
        &mut self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Option<&mut ConversationParticipant> {
        self.participants
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
    }

    fn insert_message(&mut self, new: &NewMessage) -> MessageRecord {
        let now = self.tick();
        let message = MessageRecord {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content.clone(),
            message_type: new.message_type.as_str().to_string(),
            attachments: Json(new.attachments.clone()),
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.messages.push(message.clone());

        if let Some(conversation) = self.conversation_mut(new.conversation_id) {
            conversation.last_message_id = Some(message.id);
            conversation.last_message_content = Some(message.content.clone());
            conversation.last_message_sender_id = Some(message.sender_id);
            conversation.last_message_at = Some(now);
            conversation.last_activity = now;
            conversation.updated_at = now;
        }
        if let Some(receiver) = self.participant_mut(new.conversation_id, new.receiver_id) {
            receiver.unread_count += 1;
        }

        message
    }

    fn appointment_for(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        status: AppointmentStatus,
    ) -> Appointment {
        let created_at = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            doctor_user_id: self.doctors.get(&doctor_id).copied().unwrap_or(doctor_id),
            status: status.as_str().to_string(),
            appointment_date: created_at,
            created_at,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, full_name: &str, role: Role) -> Principal {
        let user = UserProfile {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            email: format!("{}@clinic.test", Uuid::new_v4().simple()),
            phone: None,
            avatar_url: None,
            role: role.as_str().to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        let principal = user.principal();
        self.tables.lock().await.users.push(user);
        principal
    }

    /// Creates a doctor profile owned by `user_id` and returns the profile id.
    pub async fn add_doctor(&self, user_id: Uuid) -> Uuid {
        let doctor_id = Uuid::new_v4();
        self.tables.lock().await.doctors.insert(doctor_id, user_id);
        doctor_id
    }

    pub async fn add_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        status: AppointmentStatus,
    ) -> Uuid {
        let mut tables = self.tables.lock().await;
        let appointment = tables.appointment_for(patient_id, doctor_id, status);
        let id = appointment.id;
        tables.appointments.push(appointment);
        id
    }

    pub async fn deactivate_user(&self, user_id: Uuid) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.is_active = false;
        }
    }

    pub async fn unread_for(&self, conversation_id: Uuid, user_id: Uuid) -> i32 {
        self.tables
            .lock()
            .await
            .participants
            .iter()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
            .map(|p| p.unread_count)
            .unwrap_or(0)
    }

    /// Unread, non-deleted messages addressed to `user_id`, counted from the rows.
    pub async fn unread_message_count(&self, conversation_id: Uuid, user_id: Uuid) -> usize {
        self.tables
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == conversation_id
                    && m.receiver_id == user_id
                    && m.read_at.is_none()
                    && !m.is_deleted
            })
            .count()
    }

    pub async fn active_conversation_count(&self) -> usize {
        self.tables
            .lock()
            .await
            .conversations
            .iter()
            .filter(|c| c.is_active)
            .count()
    }

    pub async fn message(&self, message_id: Uuid) -> Option<MessageRecord> {
        self.tables
            .lock()
            .await
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }
}

#[async_trait]
impl DirectoryRepository for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| user_ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn find_doctor_owner(&self, doctor_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.tables.lock().await.doctors.get(&doctor_id).copied())
    }

    async fn find_chat_appointment(
        &self,
        patient_id: Uuid,
        doctor_user_id: Uuid,
    ) -> Result<Option<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id && a.doctor_user_id == doctor_user_id)
            .filter(|a| a.status().is_some_and(|s| s.allows_chat()))
            .max_by_key(|a| a.appointment_date)
            .cloned())
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .appointments
            .iter()
            .find(|a| a.id == appointment_id)
            .cloned())
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn find_active_between(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let (low, high) = ordered_pair(a, b);
        let tables = self.tables.lock().await;
        Ok(tables
            .conversations
            .iter()
            .find(|c| c.is_active && c.participant_low == low && c.participant_high == high)
            .cloned())
    }

    async fn create_conversation(&self, new: NewConversation) -> Result<Option<Conversation>> {
        let [(sender_id, sender_role), (receiver_id, receiver_role)] = new.participants;
        let (low, high) = ordered_pair(sender_id, receiver_id);
        let mut tables = self.tables.lock().await;

        if tables
            .conversations
            .iter()
            .any(|c| c.is_active && c.participant_low == low && c.participant_high == high)
        {
            return Ok(None);
        }

        let now = tables.tick();
        let id = Uuid::new_v4();
        tables.conversations.push(Conversation {
            id,
            participant_low: low,
            participant_high: high,
            related_appointment_id: new.related_appointment_id,
            is_active: true,
            last_message_id: None,
            last_message_content: None,
            last_message_sender_id: None,
            last_message_at: None,
            last_activity: now,
            created_at: now,
            updated_at: now,
        });
        for (user_id, role) in [(sender_id, sender_role), (receiver_id, receiver_role)] {
            tables.participants.push(ConversationParticipant {
                conversation_id: id,
                user_id,
                role: role.as_str().to_string(),
                unread_count: 0,
                joined_at: now,
            });
        }

        if let Some(content) = &new.initial_message {
            tables.insert_message(&NewMessage {
                conversation_id: id,
                sender_id,
                receiver_id,
                content: content.clone(),
                message_type: Default::default(),
                attachments: Vec::new(),
            });
        }

        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ConversationParticipant>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .participants
            .iter()
            .filter(|p| conversation_ids.contains(&p.conversation_id))
            .cloned()
            .collect())
    }

    async fn list_for_participant(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let tables = self.tables.lock().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.is_active && c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(conversations)
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Conversation>, i64)> {
        let tables = self.tables.lock().await;
        let mut active: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        let total = active.len() as i64;
        let page = active
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn append_message(&self, new: NewMessage) -> Result<Option<MessageRecord>> {
        let mut tables = self.tables.lock().await;
        let active = tables
            .conversations
            .iter()
            .any(|c| c.id == new.conversation_id && c.is_active);
        if !active {
            return Ok(None);
        }
        Ok(Some(tables.insert_message(&new)))
    }

    async fn find_messages_page(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageRecord>, i64)> {
        let tables = self.tables.lock().await;
        let mut visible: Vec<MessageRecord> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && !m.is_deleted)
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = visible.len() as i64;
        let page = visible
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let now = tables.tick();
        let mut marked = 0;
        for message in tables.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id
                && m.sender_id != reader_id
                && m.read_at.is_none()
                && !m.is_deleted
        }) {
            message.read_at = Some(now);
            marked += 1;
        }
        if let Some(reader) = tables.participant_mut(conversation_id, reader_id) {
            reader.unread_count = 0;
        }
        Ok(marked)
    }

    async fn find_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>> {
        Ok(self.message(message_id).await)
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<DeleteOutcome>> {
        let mut tables = self.tables.lock().await;
        let now = tables.tick();

        let Some(message) = tables.messages.iter_mut().find(|m| m.id == message_id) else {
            return Ok(None);
        };
        if message.is_deleted {
            return Ok(Some(DeleteOutcome::AlreadyDeleted));
        }
        message.is_deleted = true;
        message.deleted_at = Some(now);
        message.content = DELETED_MESSAGE_PLACEHOLDER.to_string();
        message.updated_at = now;
        let deleted = message.clone();

        if deleted.read_at.is_none() {
            if let Some(receiver) =
                tables.participant_mut(deleted.conversation_id, deleted.receiver_id)
            {
                receiver.unread_count = (receiver.unread_count - 1).max(0);
            }
        }

        let previous = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == deleted.conversation_id && !m.is_deleted)
            .max_by_key(|m| m.created_at)
            .cloned();

        if let Some(conversation) = tables.conversation_mut(deleted.conversation_id) {
            if conversation.last_message_id == Some(deleted.id) {
                match previous {
                    Some(previous) => {
                        conversation.last_message_id = Some(previous.id);
                        conversation.last_message_content = Some(previous.content);
                        conversation.last_message_sender_id = Some(previous.sender_id);
                        conversation.last_message_at = Some(previous.created_at);
                    }
                    None => {
                        conversation.last_message_id = None;
                        conversation.last_message_content =
                            Some(DELETED_MESSAGE_PLACEHOLDER.to_string());
                        conversation.last_message_sender_id = Some(deleted.sender_id);
                        conversation.last_message_at = Some(now);
                    }
                }
                conversation.updated_at = now;
            }
        }

        Ok(Some(DeleteOutcome::Deleted(deleted)))
    }

    async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.conversation_mut(conversation_id) {
            Some(conversation) if conversation.is_active => {
                conversation.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_unread_total(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.lock().await;
        let count = tables
            .messages
            .iter()
            .filter(|m| m.sender_id != user_id && m.read_at.is_none() && !m.is_deleted)
            .filter(|m| {
                tables
                    .conversations
                    .iter()
                    .any(|c| c.id == m.conversation_id && c.is_active && c.has_participant(user_id))
            })
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl StatsRepository for MemoryStore {
    async fn overview(&self) -> Result<OverviewStats> {
        let tables = self.tables.lock().await;
        let count_role =
            |role: Role| tables.users.iter().filter(|u| u.role() == role).count() as i64;

        let mut by_status: HashMap<String, i64> = HashMap::new();
        for appointment in &tables.appointments {
            *by_status.entry(appointment.status.clone()).or_default() += 1;
        }
        let mut appointments_by_status: Vec<StatusCount> = by_status
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        appointments_by_status.sort_by(|a, b| a.status.cmp(&b.status));

        let day_ago = Utc::now() - Duration::hours(24);

        Ok(OverviewStats {
            total_users: tables.users.len() as i64,
            total_doctors: count_role(Role::Doctor),
            total_patients: count_role(Role::User),
            total_appointments: tables.appointments.len() as i64,
            appointments_by_status,
            active_conversations: tables
                .conversations
                .iter()
                .filter(|c| c.is_active)
                .count() as i64,
            messages_last_24h: tables
                .messages
                .iter()
                .filter(|m| m.created_at >= day_ago)
                .count() as i64,
        })
    }

    async fn bucket_counts(
        &self,
        collection: Collection,
        period: Period,
        since: DateTime<Utc>,
    ) -> Result<Vec<BucketCount>> {
        let tables = self.tables.lock().await;
        let created: Vec<DateTime<Utc>> = match collection {
            Collection::Users => tables.users.iter().map(|u| u.created_at).collect(),
            Collection::Appointments => tables.appointments.iter().map(|a| a.created_at).collect(),
        };

        let mut counts: HashMap<DateTime<Utc>, i64> = HashMap::new();
        for at in created.into_iter().filter(|at| *at >= since) {
            *counts.entry(period.truncate(at)).or_default() += 1;
        }

        let mut buckets: Vec<BucketCount> = counts
            .into_iter()
            .map(|(bucket, count)| BucketCount { bucket, count })
            .collect();
        buckets.sort_by_key(|b| b.bucket);
        Ok(buckets)
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/clinic_chat_test".to_string(),
        database_max_connections: 1,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        allowed_origins: vec!["http://localhost:3000".to_string()],
        default_page_size: 50,
        max_page_size: 100,
    }
}

/// Application state wired entirely to `store`.
pub fn test_state(store: Arc<MemoryStore>) -> AppState {
    let ws_connections = ConnectionManager::new();
    AppState {
        config: Arc::new(test_config()),
        ws_connections: ws_connections.clone(),
        directory: store.clone(),
        chat_service: ChatService::new(store.clone(), store.clone(), ws_connections),
        stats_service: StatsService::new(store),
    }
}

pub fn token_for(principal: Principal) -> String {
    create_jwt(principal.id, principal.role, TEST_JWT_SECRET, 1).unwrap()
}
