use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::Client;

use crate::models::Message;
use crate::relay::{conversation_topic, user_topic, ChangeEvent, SubscriptionRegistry};

pub async fn publish(client: &Client, topic: &str, event: &ChangeEvent) -> redis::RedisResult<()> {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error=%e, "change event serialization failed");
            return Ok(());
        }
    };
    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.publish::<_, _, ()>(topic, payload).await
}

/// Fans out one message-row change: the message event on the conversation
/// topic, plus a conversation-changed ping on both participants' user topics
/// so list views refetch their aggregates.
pub async fn publish_message_event(
    client: &Client,
    message: &Message,
    event: ChangeEvent,
) -> redis::RedisResult<()> {
    let topic = conversation_topic(message.listing_id, message.sender_id, message.receiver_id);
    publish(client, &topic, &event).await?;

    let (low, high) = crate::services::conversation_service::ConversationService::canonical_pair(
        message.sender_id,
        message.receiver_id,
    );
    let ping = ChangeEvent::ConversationChanged {
        listing_id: message.listing_id,
        user_low: low,
        user_high: high,
    };
    publish(client, &user_topic(low), &ping).await?;
    publish(client, &user_topic(high), &ping).await
}

/// Cross-instance listener: everything published on conversation/user
/// channels (by this or any other instance) is decoded and re-broadcast into
/// the local registry. Undecodable payloads are logged and dropped; the
/// at-least-once, possibly-reordered contract is absorbed by consumers.
pub async fn start_relay_listener(
    client: Client,
    registry: SubscriptionRegistry,
) -> redis::RedisResult<()> {
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe("conversation:*").await?;
    pubsub.psubscribe("user:*").await?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().into();
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error=%e, %channel, "unreadable relay payload");
                continue;
            }
        };
        match serde_json::from_str::<ChangeEvent>(&payload) {
            Ok(event) => registry.broadcast(&channel, event).await,
            Err(e) => {
                tracing::warn!(error=%e, %channel, "undecodable relay payload");
            }
        }
    }
    Ok(())
}
