use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (listing, unordered participant pair). The pair is stored in
/// canonical order: `user_low < user_high` by UUID byte order.
///
/// Unread counts are intentionally absent; they are recomputed from
/// `messages` at read time so there is a single source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub last_message: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub last_email_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Conversation as presented to one participant: the aggregate row plus the
/// caller's recomputed unread count.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub other_user_id: Uuid,
    pub last_message: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub unread_count: i64,
}
