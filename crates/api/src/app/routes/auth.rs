//! Login, refresh, role selection and logout.

use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};

use helpdesk_auth::{AuthError, AvailableRoles, RoleSelectionRequest, SessionContext, SessionTokens};

use crate::app::AppState;
use crate::app::client::{
    bearer_token, clear_refresh_cookie, device_info, refresh_cookie, refresh_token_cookie,
};
use crate::app::dto::{LoginRequest, LogoutRequest, LogoutResponse, MeResponse, TokenResponse};
use crate::app::errors::ApiError;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Endpoints reachable without an access token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/select-role", post(select_role))
        .route("/auth/available-roles", get(available_roles))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /auth/login - Exchange credentials for an access token and a
/// refresh-token cookie
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let now = Utc::now();
    let device = device_info(&headers, body.device_name);

    let tokens = state
        .service
        .login(&body.email, &body.password, &device, now)
        .await?;

    Ok(token_response(&state, tokens, now))
}

/// POST /auth/refresh - Rotate the refresh-token cookie and mint a new
/// access token
///
/// An expired access token may accompany the request as a bearer token; its
/// active role is carried over.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let now = Utc::now();
    let raw = refresh_token_cookie(&headers);
    let device = device_info(&headers, None);

    match state
        .service
        .refresh(raw.as_deref(), bearer_token(&headers), &device, now)
        .await
    {
        Ok(tokens) => token_response(&state, tokens, now),
        Err(err) => {
            let dead_cookie = matches!(
                err,
                AuthError::RefreshTokenRevoked | AuthError::RefreshTokenExpired
            ) || (raw.is_some() && err == AuthError::TokenInvalid);
            let mut response = ApiError::from(err).into_response();
            if dead_cookie {
                set_cookie(&mut response, clear_refresh_cookie(state.cookie_secure));
            }
            response
        }
    }
}

/// POST /auth/select-role - Reissue the access token with a new active role
pub async fn select_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    body: Result<Json<RoleSelectionRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        AuthError::invalid_role_request("body", rejection.body_text())
    })?;

    let issued = state
        .service
        .select_role(&session, &request, Utc::now())
        .await?;

    Ok(Json(issued.into()))
}

/// GET /auth/available-roles - Roles the caller may select
pub async fn available_roles(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<AvailableRoles>, ApiError> {
    Ok(Json(state.service.available_roles(&session).await?))
}

/// POST /auth/logout - Revoke this session (or every session with
/// `{"everywhere": true}`) and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(session): Extension<SessionContext>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Response, ApiError> {
    let everywhere = body.map(|Json(b)| b.everywhere).unwrap_or_default();
    let raw = refresh_token_cookie(&headers);

    let outcome = state
        .service
        .logout(&session, raw.as_deref(), everywhere, Utc::now())
        .await?;

    Ok((
        [(header::SET_COOKIE, clear_refresh_cookie(state.cookie_secure))],
        Json(LogoutResponse {
            revoked_sessions: outcome.revoked_sessions,
            everywhere: outcome.everywhere,
        }),
    )
        .into_response())
}

/// GET /auth/me - Identity and roles carried by the presented token
pub async fn me(Extension(session): Extension<SessionContext>) -> Json<MeResponse> {
    Json(MeResponse::from(&session))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn token_response(state: &AppState, tokens: SessionTokens, now: DateTime<Utc>) -> Response {
    let mut response = Json(TokenResponse::from(tokens.access)).into_response();
    // No new cookie when a grace-window retry reused the winner's rotation.
    if let Some(raw) = tokens.refresh_token.as_deref() {
        set_cookie(
            &mut response,
            refresh_cookie(raw, tokens.refresh_expires_at, now, state.cookie_secure),
        );
    }
    response
}

fn set_cookie(response: &mut Response, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => tracing::error!(error = %err, "refresh cookie is not a valid header value"),
    }
}
