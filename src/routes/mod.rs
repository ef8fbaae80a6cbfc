pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod ws;

use axum::routing::{delete, get, patch, post};
use axum::{middleware, Json, Router};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/listings/:listing_id/messages",
            post(messages::send_message),
        )
        .route(
            "/api/v1/listings/:listing_id/messages/:other_user_id",
            get(messages::list_messages),
        )
        .route(
            "/api/v1/listings/:listing_id/messages/:other_user_id/read",
            post(messages::mark_read),
        )
        .route(
            "/api/v1/messages/:message_id",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route("/api/v1/conversations", get(conversations::list_conversations))
        .route(
            "/api/v1/conversations/unread-count",
            get(conversations::unread_total),
        )
        .route(
            "/api/v1/listings/:listing_id/conversations/:other_user_id",
            delete(conversations::delete_conversation),
        )
        .route(
            "/api/v1/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(notifications::mark_notification_read),
        )
        .route(
            "/api/v1/ws/conversations/:listing_id/:other_user_id",
            get(ws::conversation_stream),
        )
        .route("/api/v1/ws/user", get(ws::user_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
