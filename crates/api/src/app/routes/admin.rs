//! Administrative maintenance endpoints (PLATFORM_ADMIN only).

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;

use crate::app::AppState;
use crate::app::dto::CleanupResponse;
use crate::app::errors::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/refresh-tokens/cleanup", post(cleanup_refresh_tokens))
}

/// POST /admin/refresh-tokens/cleanup - Delete expired refresh tokens now
pub async fn cleanup_refresh_tokens(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deleted = state.service.clean_expired(Utc::now()).await?;
    Ok(Json(CleanupResponse { deleted }))
}
