//! Bearer authentication and role guards.
//!
//! `auth_middleware` validates the access token once per request and inserts
//! a [`SessionContext`] into the request extensions; handlers take it with
//! `Extension<SessionContext>`. `require_roles` must run after it.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use helpdesk_auth::{AuthError, AuthService, RoleCode, SessionContext, authorize_with_directory};

use crate::app::client::bearer_token;
use crate::app::errors::ApiError;
use crate::app::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = bearer_token(req.headers()).map(str::to_string);

    let token = match state
        .service
        .validator()
        .validate_access_token(bearer.as_deref(), Utc::now())
        .await
    {
        Ok(token) => token,
        Err(err) => return ApiError::from(err).into_response(),
    };

    // Validation succeeded, so a bearer was present.
    let session = SessionContext::new(token, bearer.unwrap_or_default());
    req.extensions_mut().insert(session);

    next.run(req).await
}

/// State for [`require_roles`]: the roles any one of which grants access.
#[derive(Clone)]
pub struct RoleGuard {
    service: Arc<AuthService>,
    required: Arc<[RoleCode]>,
}

impl RoleGuard {
    pub fn new(service: Arc<AuthService>, required: impl Into<Arc<[RoleCode]>>) -> Self {
        Self {
            service,
            required: required.into(),
        }
    }
}

pub async fn require_roles(
    State(guard): State<RoleGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(session) = req.extensions().get::<SessionContext>().cloned() else {
        return ApiError::from(AuthError::TokenMissing).into_response();
    };

    let decision = match authorize_with_directory(
        session.token(),
        &guard.required,
        guard.service.directory(),
    )
    .await
    {
        Ok(decision) => decision,
        Err(err) => return ApiError::from(err).into_response(),
    };

    if let Err(err) = decision.into_result() {
        tracing::info!(
            user_id = %session.user_id(),
            path = %req.uri().path(),
            "authorization denied"
        );
        return ApiError::from(err).into_response();
    }

    next.run(req).await
}
