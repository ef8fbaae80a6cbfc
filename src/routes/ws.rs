use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::middleware::auth::CurrentUser;
use crate::relay::{conversation_topic, user_topic, Subscription};
use crate::state::AppState;

/// Stream for one open conversation view. The socket closes cleanly when
/// the client goes away; the subscription is torn down either way.
pub async fn conversation_stream(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((listing_id, other_user_id)): Path<(Uuid, Uuid)>,
    ws: WebSocketUpgrade,
) -> Response {
    let topic = conversation_topic(listing_id, user.id, other_user_id);
    ws.on_upgrade(move |socket| async move {
        let subscription = state.registry.subscribe(&topic).await;
        pump(socket, subscription).await;
    })
}

/// Per-user stream feeding the conversation-list badge counts.
pub async fn user_stream(
    State(state): State<AppState>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Response {
    let topic = user_topic(user.id);
    ws.on_upgrade(move |socket| async move {
        let subscription = state.registry.subscribe(&topic).await;
        pump(socket, subscription).await;
    })
}

async fn pump(mut socket: WebSocket, mut subscription: Subscription) {
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error=%e, "event serialization failed");
                        continue;
                    }
                };
                if socket.send(WsMessage::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Inbound traffic is ignored; mutations go through HTTP.
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    subscription.unsubscribe().await;
}
