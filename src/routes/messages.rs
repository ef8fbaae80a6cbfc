use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::CurrentUser;
use crate::models::Message;
use crate::relay::{pubsub, ChangeEvent};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub body: String,
    /// Client-generated correlation id for optimistic reconciliation.
    pub client_ref: Option<String>,
}

pub async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = MessageService::send(
        &state.db,
        listing_id,
        user.id,
        body.receiver_id,
        &body.body,
        body.client_ref.as_deref(),
    )
    .await?;

    // Everything past the insert is fan-out: aggregate refresh, relay
    // events, notification dispatch. None of it can fail the send.
    refresh_aggregate(&state, &message).await;
    fan_out(
        &state,
        &message,
        ChangeEvent::MessageInserted {
            message: message.clone(),
        },
    )
    .await;
    spawn_dispatch(&state, message.clone());

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((listing_id, other_user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<Message>>> {
    let messages =
        MessageService::list_for_conversation(&state.db, listing_id, user.id, other_user_id)
            .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub body: String,
}

pub async fn edit_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> AppResult<Json<Message>> {
    let message = MessageService::edit(&state.db, message_id, user.id, &body.body).await?;

    refresh_aggregate(&state, &message).await;
    fan_out(
        &state,
        &message,
        ChangeEvent::MessageUpdated {
            message: message.clone(),
        },
    )
    .await;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let message = MessageService::soft_delete(&state.db, message_id, user.id).await?;

    // Soft delete rides the update event; the row still exists.
    refresh_aggregate(&state, &message).await;
    fan_out(
        &state,
        &message,
        ChangeEvent::MessageUpdated {
            message: message.clone(),
        },
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((listing_id, other_user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MarkReadResponse>> {
    let updated = MessageService::mark_read(&state.db, listing_id, other_user_id, user.id).await?;

    if updated > 0 {
        publish_conversation_ping(&state, listing_id, user.id, other_user_id).await;
    }

    Ok(Json(MarkReadResponse { updated }))
}

async fn refresh_aggregate(state: &AppState, message: &Message) {
    if let Err(e) = ConversationService::refresh(
        &state.db,
        message.listing_id,
        message.sender_id,
        message.receiver_id,
    )
    .await
    {
        tracing::warn!(error=%e, listing=%message.listing_id, "conversation refresh failed; next refetch reconciles");
    }
}

async fn fan_out(state: &AppState, message: &Message, event: ChangeEvent) {
    if let Err(e) = pubsub::publish_message_event(&state.redis, message, event).await {
        tracing::warn!(error=%e, "relay publish failed");
    }
}

/// Tells both participants' open views that the aggregate changed (unread
/// counters, snippets); subscribers refetch rather than patch.
pub(crate) async fn publish_conversation_ping(
    state: &AppState,
    listing_id: Uuid,
    user_a: Uuid,
    user_b: Uuid,
) {
    let (low, high) = ConversationService::canonical_pair(user_a, user_b);
    let ping = ChangeEvent::ConversationChanged {
        listing_id,
        user_low: low,
        user_high: high,
    };
    let topics = [
        crate::relay::conversation_topic(listing_id, low, high),
        crate::relay::user_topic(low),
        crate::relay::user_topic(high),
    ];
    for topic in topics {
        if let Err(e) = pubsub::publish(&state.redis, &topic, &ping).await {
            tracing::warn!(error=%e, %topic, "relay publish failed");
        }
    }
}

fn spawn_dispatch(state: &AppState, message: Message) {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher.on_new_message(&db, &message).await {
            tracing::warn!(error=%e, message_id=%message.id, "notification dispatch failed");
        }
    });
}
