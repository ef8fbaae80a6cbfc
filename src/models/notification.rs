use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NewMessage,
    ItemSold,
    OrderShipped,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewMessage => "new-message",
            NotificationKind::ItemSold => "item-sold",
            NotificationKind::OrderShipped => "order-shipped",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "new-message" => Some(NotificationKind::NewMessage),
            "item-sold" => Some(NotificationKind::ItemSold),
            "order-shipped" => Some(NotificationKind::OrderShipped),
            _ => None,
        }
    }
}

/// In-app notification. Created for every dispatched event regardless of the
/// email escalation outcome; only the read flag mutates afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub listing_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            NotificationKind::NewMessage,
            NotificationKind::ItemSold,
            NotificationKind::OrderShipped,
        ] {
            assert_eq!(NotificationKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::from_str("poke"), None);
    }
}
