use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message between two users about one listing.
///
/// `client_ref` is a client-generated correlation id carried through so
/// optimistic UI entries can be matched against the confirmed row. It is
/// never treated as identity; `id` is.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub client_ref: Option<String>,
    pub is_read: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub edited: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
