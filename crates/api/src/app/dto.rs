//! Request/response bodies. Responses use camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use helpdesk_auth::{IssuedAccessToken, RoleClaim, SessionContext, SessionSummary};
use helpdesk_core::{CompanyId, SessionId, UserId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub everywhere: bool,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub active_role: Option<RoleClaim>,
}

impl From<IssuedAccessToken> for TokenResponse {
    fn from(issued: IssuedAccessToken) -> Self {
        Self {
            active_role: issued.active_role(),
            access_token: issued.token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: UserId,
    pub email: String,
    pub session_id: SessionId,
    pub roles: Vec<RoleClaim>,
    pub companies: Vec<CompanyId>,
    pub active_role: Option<RoleClaim>,
    pub expires_at: DateTime<Utc>,
}

impl From<&SessionContext> for MeResponse {
    fn from(session: &SessionContext) -> Self {
        let claims = session.claims();
        Self {
            user_id: session.user_id(),
            email: claims.email.clone(),
            session_id: session.session_id(),
            roles: session.token().roles().to_vec(),
            companies: claims.companies.clone(),
            active_role: session.active_role(),
            expires_at: session.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub revoked_sessions: u64,
    pub everywhere: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}
