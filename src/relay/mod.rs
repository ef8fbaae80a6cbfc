//! Change-event relay: typed row-change events fanned out to subscribed
//! views, in-process through the registry and cross-instance through redis
//! pub/sub. Delivery is at-least-once and may be reordered; consumers dedup
//! by message id / correlation id rather than relying on sequence.

pub mod pubsub;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Message;
use crate::services::conversation_service::ConversationService;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    /// New row; append unless the id or correlation id is already known.
    #[serde(rename = "message.inserted")]
    MessageInserted { message: Message },

    /// Field changes, including edit and the soft-delete flag flip.
    #[serde(rename = "message.updated")]
    MessageUpdated { message: Message },

    /// Hard removal; only the delete-conversation action produces these.
    #[serde(rename = "message.removed")]
    MessageRemoved { message_id: Uuid, listing_id: Uuid },

    /// Aggregate changed; subscribers refetch rather than patching fields.
    #[serde(rename = "conversation.changed")]
    ConversationChanged {
        listing_id: Uuid,
        user_low: Uuid,
        user_high: Uuid,
    },
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageInserted { .. } => "message.inserted",
            Self::MessageUpdated { .. } => "message.updated",
            Self::MessageRemoved { .. } => "message.removed",
            Self::ConversationChanged { .. } => "conversation.changed",
        }
    }
}

/// Topic for one conversation view. The pair is canonicalized so both
/// participants subscribe to the same channel.
pub fn conversation_topic(listing_id: Uuid, user_a: Uuid, user_b: Uuid) -> String {
    let (low, high) = ConversationService::canonical_pair(user_a, user_b);
    format!("conversation:{listing_id}:{low}:{high}")
}

/// Topic for one user's global stream (conversation-list badge counts).
pub fn user_topic(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// In-process fan-out of change events. One sender list per topic; dead
/// receivers are pruned on broadcast.
#[derive(Default, Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<(u64, UnboundedSender<ChangeEvent>)>>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.write().await;
        guard.entry(topic.to_string()).or_default().push((id, tx));
        Subscription {
            registry: self.clone(),
            topic: topic.to_string(),
            id,
            rx,
        }
    }

    pub async fn broadcast(&self, topic: &str, event: ChangeEvent) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(topic) {
            list.retain(|(_, sender)| sender.send(event.clone()).is_ok());
            if list.is_empty() {
                guard.remove(topic);
            }
        }
    }

    async fn remove(&self, topic: &str, id: u64) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(topic) {
            list.retain(|(entry_id, _)| *entry_id != id);
            if list.is_empty() {
                guard.remove(topic);
            }
        }
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .await
            .get(topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// Handle for one open view. Receive events via `recv`; tear down with
/// `unsubscribe` when the view closes.
pub struct Subscription {
    registry: SubscriptionRegistry,
    topic: String,
    id: u64,
    rx: UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn unsubscribe(self) {
        self.registry.remove(&self.topic, self.id).await;
    }
}
