use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::CurrentUser;
use crate::models::ConversationSummary;
use crate::relay::{pubsub, ChangeEvent};
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    let summaries = ConversationService::list_for_user(&state.db, user.id).await?;
    Ok(Json(summaries))
}

#[derive(Serialize)]
pub struct UnreadTotalResponse {
    pub count: i64,
}

pub async fn unread_total(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<UnreadTotalResponse>> {
    let count = ConversationService::unread_total(&state.db, user.id).await?;
    Ok(Json(UnreadTotalResponse { count }))
}

/// Deletes a whole conversation and its messages. This is the only path
/// that hard-deletes message rows, so open views get explicit removal
/// events instead of soft-delete updates.
pub async fn delete_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((listing_id, other_user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let removed_ids =
        ConversationService::delete(&state.db, listing_id, user.id, other_user_id).await?;

    let topic = crate::relay::conversation_topic(listing_id, user.id, other_user_id);
    for message_id in removed_ids {
        let event = ChangeEvent::MessageRemoved {
            message_id,
            listing_id,
        };
        if let Err(e) = pubsub::publish(&state.redis, &topic, &event).await {
            tracing::warn!(error=%e, "relay publish failed");
        }
    }
    super::messages::publish_conversation_ping(&state, listing_id, user.id, other_user_id).await;

    Ok(StatusCode::NO_CONTENT)
}
