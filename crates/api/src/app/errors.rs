//! Consistent JSON error responses.
//!
//! Every failure renders as `{"error": CODE, "message": text}` with `CODE`
//! taken from [`AuthError::code`].

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use helpdesk_auth::AuthError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::TokenMissing
        | AuthError::TokenInvalid
        | AuthError::TokenExpired
        | AuthError::TokenBlacklisted
        | AuthError::RefreshTokenMissing
        | AuthError::RefreshTokenRevoked
        | AuthError::RefreshTokenExpired
        | AuthError::InvalidCredentials
        | AuthError::UserInactive => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden(_) | AuthError::RoleNotAssigned | AuthError::CompanyContextMismatch => {
            StatusCode::FORBIDDEN
        }
        AuthError::InvalidRoleRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error so handlers can use `?` on [`AuthError`] and body rejections.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(message) => {
                return json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message);
            }
            ApiError::Auth(err) => err,
        };
        let status = status_for(&err);
        // Backend details stay in the logs.
        let message = match &err {
            AuthError::Unavailable(detail) => {
                tracing::error!(code = err.code(), detail = %detail, "auth backend failed");
                "authentication backend unavailable".to_string()
            }
            AuthError::Internal(detail) => {
                tracing::error!(code = err.code(), detail = %detail, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        json_error(status, err.code(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthorized() {
        for err in [
            AuthError::TokenMissing,
            AuthError::TokenInvalid,
            AuthError::TokenExpired,
            AuthError::TokenBlacklisted,
            AuthError::RefreshTokenRevoked,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(status_for(&err), StatusCode::UNAUTHORIZED, "{err:?}");
        }
    }

    #[test]
    fn role_failures_split_between_forbidden_and_unprocessable() {
        assert_eq!(status_for(&AuthError::RoleNotAssigned), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AuthError::CompanyContextMismatch), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&AuthError::invalid_role_request("company_id", "required")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn backend_failures_fail_closed_with_503() {
        let response = ApiError::from(AuthError::Unavailable("redis down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
