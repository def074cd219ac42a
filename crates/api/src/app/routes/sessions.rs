//! Session listing and remote revocation.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get},
};
use chrono::Utc;

use helpdesk_auth::{AuthError, SessionContext};
use helpdesk_core::SessionId;

use crate::app::AppState;
use crate::app::client::refresh_token_cookie;
use crate::app::dto::SessionsResponse;
use crate::app::errors::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/sessions", get(list_sessions))
        .route("/auth/sessions/:id", delete(revoke_session))
}

/// GET /auth/sessions - Active sessions of the caller, current one flagged
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let raw = refresh_token_cookie(&headers);
    let sessions = state
        .service
        .sessions(&session, raw.as_deref(), Utc::now())
        .await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// DELETE /auth/sessions/:id - Revoke another of the caller's sessions
pub async fn revoke_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target: SessionId = id
        .parse()
        .map_err(|_| AuthError::NotFound("session not found".to_string()))?;
    let raw = refresh_token_cookie(&headers);

    state
        .service
        .revoke_session(&session, target, raw.as_deref(), Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
