use crate::{db::is_unique_violation, error::Result};
use axum::async_trait;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::chat_models::{
    ordered_pair, Conversation, ConversationParticipant, DeleteOutcome, MessageRecord,
    NewConversation, NewMessage, DELETED_MESSAGE_PLACEHOLDER,
};

/// Conversation and message storage.
///
/// Every mutation of a conversation (send, read, delete, close) must be
/// serialized per conversation so the per-participant unread counters always
/// equal the number of unread, non-deleted messages addressed to them.
#[async_trait]
pub trait ChatRepository: Send + Sync + 'static {
    async fn find_active_between(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>>;

    /// Inserts the conversation, its participants and the optional first
    /// message. Returns `None` when an active conversation for the pair was
    /// created concurrently.
    async fn create_conversation(&self, new: NewConversation) -> Result<Option<Conversation>>;

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ConversationParticipant>>;

    async fn list_for_participant(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Conversation>, i64)>;

    /// Appends the message, refreshes the cached last message and bumps the
    /// receiver's counter. `None` if the conversation is no longer active.
    async fn append_message(&self, new: NewMessage) -> Result<Option<MessageRecord>>;

    /// A page of non-deleted messages, newest first, with the total count.
    async fn find_messages_page(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageRecord>, i64)>;

    /// Marks every unread message not sent by `reader_id` as read and resets
    /// the reader's counter. Returns the number of messages marked.
    async fn mark_conversation_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64>;

    async fn find_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>>;

    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<DeleteOutcome>>;

    async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool>;

    async fn count_unread_total(&self, user_id: Uuid) -> Result<i64>;
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_conversation(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(conversation_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(conversation)
    }

    async fn insert_message(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewMessage,
    ) -> Result<MessageRecord> {
        let message = sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO messages (conversation_id, sender_id, receiver_id, content, message_type, attachments)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(&new.content)
        .bind(new.message_type.as_str())
        .bind(Json(&new.attachments))
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE conversations
             SET last_message_id = $2,
                 last_message_content = $3,
                 last_message_sender_id = $4,
                 last_message_at = $5,
                 last_activity = $5,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(new.conversation_id)
        .bind(message.id)
        .bind(&message.content)
        .bind(message.sender_id)
        .bind(message.created_at)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = unread_count + 1
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(new.conversation_id)
        .bind(new.receiver_id)
        .execute(&mut **tx)
        .await?;

        Ok(message)
    }

    async fn insert_participants(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        new: &NewConversation,
    ) -> Result<()> {
        let [(first_id, first_role), (second_id, second_role)] = new.participants;

        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id, role)
             VALUES ($1, $2, $3), ($1, $4, $5)",
        )
        .bind(conversation_id)
        .bind(first_id)
        .bind(first_role.as_str())
        .bind(second_id)
        .bind(second_role.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn find_active_between(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let (low, high) = ordered_pair(a, b);
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations
             WHERE participant_low = $1 AND participant_high = $2 AND is_active",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn create_conversation(&self, new: NewConversation) -> Result<Option<Conversation>> {
        let [(sender_id, _), (receiver_id, _)] = new.participants;
        let (low, high) = ordered_pair(sender_id, receiver_id);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (participant_low, participant_high, related_appointment_id)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(low)
        .bind(high)
        .bind(new.related_appointment_id)
        .fetch_one(&mut *tx)
        .await;

        let conversation = match inserted {
            Ok(conversation) => conversation,
            // lost the race against a concurrent create for the same pair
            Err(err) if is_unique_violation(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Self::insert_participants(&mut tx, conversation.id, &new).await?;

        let conversation = match &new.initial_message {
            Some(content) => {
                let first = NewMessage {
                    conversation_id: conversation.id,
                    sender_id,
                    receiver_id,
                    content: content.clone(),
                    message_type: Default::default(),
                    attachments: Vec::new(),
                };
                Self::insert_message(&mut tx, &first).await?;
                Self::lock_conversation(&mut tx, conversation.id)
                    .await?
                    .unwrap_or(conversation)
            }
            None => conversation,
        };

        tx.commit().await?;
        Ok(Some(conversation))
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ConversationParticipant>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let participants = sqlx::query_as::<_, ConversationParticipant>(
            "SELECT * FROM conversation_participants
             WHERE conversation_id = ANY($1)
             ORDER BY joined_at ASC",
        )
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    async fn list_for_participant(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             INNER JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = $1 AND c.is_active
             ORDER BY c.last_activity DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    async fn list_active(&self, limit: i64, offset: i64) -> Result<(Vec<Conversation>, i64)> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations
             WHERE is_active
             ORDER BY last_activity DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE is_active")
            .fetch_one(&self.pool)
            .await?;

        Ok((conversations, total))
    }

    async fn append_message(&self, new: NewMessage) -> Result<Option<MessageRecord>> {
        let mut tx = self.pool.begin().await?;

        match Self::lock_conversation(&mut tx, new.conversation_id).await? {
            Some(conversation) if conversation.is_active => {}
            _ => return Ok(None),
        }

        let message = Self::insert_message(&mut tx, &new).await?;
        tx.commit().await?;

        Ok(Some(message))
    }

    async fn find_messages_page(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageRecord>, i64)> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages
             WHERE conversation_id = $1 AND NOT is_deleted
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND NOT is_deleted",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((messages, total))
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if Self::lock_conversation(&mut tx, conversation_id).await?.is_none() {
            return Ok(0);
        }

        let marked = sqlx::query(
            "UPDATE messages
             SET read_at = NOW()
             WHERE conversation_id = $1 AND sender_id <> $2
               AND read_at IS NULL AND NOT is_deleted",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = 0
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(marked)
    }

    async fn find_message(&self, message_id: Uuid) -> Result<Option<MessageRecord>> {
        let message = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<DeleteOutcome>> {
        let Some(existing) = self.find_message(message_id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        let Some(conversation) = Self::lock_conversation(&mut tx, existing.conversation_id).await?
        else {
            return Ok(None);
        };

        let deleted = sqlx::query_as::<_, MessageRecord>(
            "UPDATE messages
             SET is_deleted = TRUE, deleted_at = NOW(), content = $2, updated_at = NOW()
             WHERE id = $1 AND NOT is_deleted
             RETURNING *",
        )
        .bind(message_id)
        .bind(DELETED_MESSAGE_PLACEHOLDER)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(deleted) = deleted else {
            tx.rollback().await?;
            return Ok(Some(DeleteOutcome::AlreadyDeleted));
        };

        if deleted.read_at.is_none() {
            sqlx::query(
                "UPDATE conversation_participants
                 SET unread_count = GREATEST(unread_count - 1, 0)
                 WHERE conversation_id = $1 AND user_id = $2",
            )
            .bind(deleted.conversation_id)
            .bind(deleted.receiver_id)
            .execute(&mut *tx)
            .await?;
        }

        if conversation.last_message_id == Some(deleted.id) {
            let previous = sqlx::query_as::<_, MessageRecord>(
                "SELECT * FROM messages
                 WHERE conversation_id = $1 AND NOT is_deleted
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
            )
            .bind(deleted.conversation_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (last_id, content, sender_id, at) = match previous {
                Some(previous) => (
                    Some(previous.id),
                    previous.content,
                    previous.sender_id,
                    previous.created_at,
                ),
                None => (
                    None,
                    DELETED_MESSAGE_PLACEHOLDER.to_string(),
                    deleted.sender_id,
                    deleted.deleted_at.unwrap_or(deleted.updated_at),
                ),
            };

            sqlx::query(
                "UPDATE conversations
                 SET last_message_id = $2,
                     last_message_content = $3,
                     last_message_sender_id = $4,
                     last_message_at = $5,
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(deleted.conversation_id)
            .bind(last_id)
            .bind(content)
            .bind(sender_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(DeleteOutcome::Deleted(deleted)))
    }

    async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE conversations
             SET is_active = FALSE, updated_at = NOW()
             WHERE id = $1 AND is_active",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_unread_total(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m
             INNER JOIN conversations c ON c.id = m.conversation_id
             INNER JOIN conversation_participants p
                ON p.conversation_id = c.id AND p.user_id = $1
             WHERE c.is_active
               AND m.sender_id <> $1
               AND m.read_at IS NULL
               AND NOT m.is_deleted",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
