use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Message;

pub struct MessageService;

impl MessageService {
    /// Persists a new message. The write itself carries no notification or
    /// aggregate side effects; callers fan those out afterwards so a failure
    /// there can never roll back delivery.
    pub async fn send(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: &str,
        client_ref: Option<&str>,
    ) -> AppResult<Message> {
        if sender_id == receiver_id {
            return Err(AppError::Validation(
                "sender and receiver must be different users".into(),
            ));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("message body cannot be empty".into()));
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, listing_id, sender_id, receiver_id, body, client_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(body)
        .bind(client_ref)
        .fetch_one(db)
        .await?;

        Ok(message)
    }

    /// All non-deleted messages between exactly this pair for this listing,
    /// oldest first. The query is pair-scoped in both directions; route-level
    /// auth guarantees the caller is one of the two.
    pub async fn list_for_conversation(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE listing_id = $1
              AND deleted = FALSE
              AND ((sender_id = $2 AND receiver_id = $3)
                OR (sender_id = $3 AND receiver_id = $2))
            ORDER BY created_at ASC
            "#,
        )
        .bind(listing_id)
        .bind(user_a)
        .bind(user_b)
        .fetch_all(db)
        .await?;

        Ok(messages)
    }

    /// Direct lookup by id, including soft-deleted rows (audit path).
    pub async fn get(db: &Pool<Postgres>, message_id: Uuid) -> AppResult<Message> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn edit(
        db: &Pool<Postgres>,
        message_id: Uuid,
        caller_id: Uuid,
        new_body: &str,
    ) -> AppResult<Message> {
        let new_body = new_body.trim();
        if new_body.is_empty() {
            return Err(AppError::Validation("message body cannot be empty".into()));
        }

        let existing = Self::get(db, message_id).await?;
        if existing.sender_id != caller_id {
            return Err(AppError::Forbidden);
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET body = $1, edited = TRUE, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(new_body)
        .bind(message_id)
        .fetch_one(db)
        .await?;

        Ok(message)
    }

    /// Marks the row deleted; it stays in the table for audit and is filtered
    /// out of every listing. Returns the updated row so the relay can fan out
    /// the transition.
    pub async fn soft_delete(
        db: &Pool<Postgres>,
        message_id: Uuid,
        caller_id: Uuid,
    ) -> AppResult<Message> {
        let existing = Self::get(db, message_id).await?;
        if existing.sender_id != caller_id {
            return Err(AppError::Forbidden);
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET deleted = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message_id)
        .fetch_one(db)
        .await?;

        Ok(message)
    }

    /// Read-state tracker: flips every unread message from `other_user` to
    /// the caller in this listing. Idempotent; a second call matches zero
    /// rows. Page-visibility gating is a client concern (the server side is
    /// safe to call at any time), see `cache::MessageCache::wants_mark_read`.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        other_user_id: Uuid,
        caller_id: Uuid,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, seen_at = NOW(), updated_at = NOW()
            WHERE listing_id = $1
              AND sender_id = $2
              AND receiver_id = $3
              AND is_read = FALSE
            "#,
        )
        .bind(listing_id)
        .bind(other_user_id)
        .bind(caller_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }
}
