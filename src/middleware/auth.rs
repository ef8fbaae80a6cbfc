use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::presence_service::PresenceService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// The authenticated caller, extracted from request extensions where the
/// auth middleware put it. Using the extractor in a handler is what makes
/// the handler require authentication.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .ok_or(AppError::Unauthenticated)?;
        Ok(CurrentUser { id: user_id })
    }
}

/// Verifies the bearer token (HS256) and stores the caller id in request
/// extensions. Every authenticated request also bumps the caller's
/// last-active timestamp, which is the global presence signal the email
/// suppression rule reads.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthenticated)?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated)?
    .claims;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Validation("invalid user id in token".into()))?;

    req.extensions_mut().insert(user_id);

    // Fire-and-forget; a missed touch only delays the presence signal.
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = PresenceService::touch(&db, user_id).await {
            tracing::debug!(error=%e, %user_id, "presence touch failed");
        }
    });

    Ok(next.run(req).await)
}
