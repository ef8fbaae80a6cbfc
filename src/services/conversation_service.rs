use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationSummary};

pub struct ConversationService;

impl ConversationService {
    /// Normalizes an unordered participant pair into storage order. Both
    /// orderings of the same two users always map to the same key.
    pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub async fn find(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let (low, high) = Self::canonical_pair(user_a, user_b);
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE listing_id = $1 AND user_low = $2 AND user_high = $3",
        )
        .bind(listing_id)
        .bind(low)
        .bind(high)
        .fetch_optional(db)
        .await?;
        Ok(conversation)
    }

    /// Recomputes the aggregate row from message state: last non-deleted
    /// message snapshot and last activity. Creates the row implicitly on the
    /// first message for the pair. Callers treat a failure here as
    /// non-fatal; the next refetch reconciles.
    pub async fn refresh(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Conversation> {
        let (low, high) = Self::canonical_pair(user_a, user_b);
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, listing_id, user_low, user_high, last_message, last_activity_at)
            SELECT $1, $2, $3, $4,
                   (SELECT body FROM messages
                     WHERE listing_id = $2 AND deleted = FALSE
                       AND ((sender_id = $3 AND receiver_id = $4)
                         OR (sender_id = $4 AND receiver_id = $3))
                     ORDER BY created_at DESC LIMIT 1),
                   NOW()
            ON CONFLICT (listing_id, user_low, user_high) DO UPDATE
            SET last_message = EXCLUDED.last_message,
                last_activity_at = EXCLUDED.last_activity_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(low)
        .bind(high)
        .fetch_one(db)
        .await?;

        Ok(conversation)
    }

    /// Unread count for `user` within one conversation, recomputed from the
    /// message rows. This is the single source of truth for unread
    /// accounting; no counter column exists to drift from it.
    pub async fn unread_for(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE listing_id = $1
              AND receiver_id = $2
              AND sender_id = $3
              AND is_read = FALSE
              AND deleted = FALSE
            "#,
        )
        .bind(listing_id)
        .bind(user_id)
        .bind(other_user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Conversation list for one user, most recent activity first, with the
    /// caller's unread count recomputed per row.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let rows = sqlx::query_as::<_, ConversationWithUnread>(
            r#"
            SELECT c.id, c.listing_id, c.user_low, c.user_high, c.last_message,
                   c.last_activity_at,
                   (SELECT COUNT(*) FROM messages m
                     WHERE m.listing_id = c.listing_id
                       AND m.receiver_id = $1
                       AND m.sender_id = CASE WHEN c.user_low = $1 THEN c.user_high ELSE c.user_low END
                       AND m.is_read = FALSE
                       AND m.deleted = FALSE) AS unread_count
            FROM conversations c
            WHERE c.user_low = $1 OR c.user_high = $1
            ORDER BY c.last_activity_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let summaries = rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.id,
                listing_id: row.listing_id,
                other_user_id: if row.user_low == user_id {
                    row.user_high
                } else {
                    row.user_low
                },
                last_message: row.last_message,
                last_activity_at: row.last_activity_at,
                unread_count: row.unread_count,
            })
            .collect();

        Ok(summaries)
    }

    /// Total unread messages across all of a user's conversations, for the
    /// global badge the per-user relay topic keeps fresh.
    pub async fn unread_total(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE receiver_id = $1 AND is_read = FALSE AND deleted = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Stamps `last_email_at` after a successful escalation email. Part of
    /// the suppression window: no further email for this conversation until
    /// the recipient is active again.
    pub async fn record_email_notified(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query("UPDATE conversations SET last_email_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Hard-deletes a conversation and its messages in one transaction. Only
    /// a participant may do this. Returns the removed message ids so the
    /// relay can emit hard-delete events for open views.
    pub async fn delete(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        caller_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        // The pair key is built from the caller, so only a participant can
        // ever resolve the row.
        let conversation = Self::find(db, listing_id, caller_id, other_user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut tx = db.begin().await?;

        let message_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM messages
            WHERE listing_id = $1
              AND ((sender_id = $2 AND receiver_id = $3)
                OR (sender_id = $3 AND receiver_id = $2))
            RETURNING id
            "#,
        )
        .bind(listing_id)
        .bind(conversation.user_low)
        .bind(conversation.user_high)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(message_ids)
    }
}

#[derive(sqlx::FromRow)]
struct ConversationWithUnread {
    id: Uuid,
    listing_id: Uuid,
    user_low: Uuid,
    user_high: Uuid,
    last_message: Option<String>,
    last_activity_at: chrono::DateTime<chrono::Utc>,
    unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            ConversationService::canonical_pair(a, b),
            ConversationService::canonical_pair(b, a)
        );
    }

    #[test]
    fn canonical_pair_orders_low_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (low, high) = ConversationService::canonical_pair(a, b);
        assert!(low <= high);
    }
}
