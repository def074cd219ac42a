//! Error taxonomy for token, session and authorization failures.
//!
//! Every failure carries a stable machine-readable code so the HTTP boundary
//! (and clients) can branch on the kind rather than on message text. In
//! particular `TokenExpired` and `TokenInvalid` stay distinct: only the former
//! may be answered with a silent refresh.

use thiserror::Error;

use helpdesk_core::DomainError;

/// Result alias used throughout this crate.
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("access token not provided")]
    TokenMissing,

    #[error("access token is invalid")]
    TokenInvalid,

    #[error("access token has expired")]
    TokenExpired,

    #[error("access token has been revoked")]
    TokenBlacklisted,

    #[error("you do not have the requested role")]
    RoleNotAssigned,

    #[error("the requested role is not held in that company")]
    CompanyContextMismatch,

    #[error("invalid role request ({field}): {message}")]
    InvalidRoleRequest { field: &'static str, message: String },

    #[error("refresh token not provided")]
    RefreshTokenMissing,

    #[error("refresh token is invalid or has been revoked")]
    RefreshTokenRevoked,

    #[error("refresh token has expired")]
    RefreshTokenExpired,

    #[error("user account is not active")]
    UserInactive,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing store (blacklist, token repository, directory) failed.
    ///
    /// Callers must treat this as a denial.
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn invalid_role_request(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRoleRequest {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TokenMissing => "TOKEN_MISSING",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenBlacklisted => "TOKEN_BLACKLISTED",
            AuthError::RoleNotAssigned => "ROLE_NOT_ASSIGNED",
            AuthError::CompanyContextMismatch => "COMPANY_CONTEXT_MISMATCH",
            AuthError::InvalidRoleRequest { .. } => "INVALID_ROLE_REQUEST",
            AuthError::RefreshTokenMissing => "REFRESH_TOKEN_REQUIRED",
            AuthError::RefreshTokenRevoked => "REFRESH_TOKEN_REVOKED",
            AuthError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthError::UserInactive => "USER_INACTIVE",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Unavailable(_) => "AUTH_BACKEND_UNAVAILABLE",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the client may recover by calling the refresh endpoint.
    pub fn is_refreshable(&self) -> bool {
        matches!(self, AuthError::TokenExpired)
    }
}

impl From<DomainError> for AuthError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvariantViolation(msg) => {
                AuthError::invalid_role_request("role_code", msg)
            }
            DomainError::InvalidId(msg) => AuthError::invalid_role_request("company_id", msg),
        }
    }
}

/// Failure reported by a storage backend (repository, directory).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for AuthError {
    fn from(value: RepositoryError) -> Self {
        AuthError::Unavailable(value.to_string())
    }
}
