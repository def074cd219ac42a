use chrono::{DateTime, Utc};

use helpdesk_core::{SessionId, UserId};

use crate::{AccessClaims, RoleClaim, ValidatedToken};

/// The authenticated identity of one request.
///
/// Built once by the HTTP middleware after validation and handed to handlers
/// explicitly; nothing reads it from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    token: ValidatedToken,
    bearer: String,
}

impl SessionContext {
    pub fn new(token: ValidatedToken, bearer: impl Into<String>) -> Self {
        Self {
            token,
            bearer: bearer.into(),
        }
    }

    pub fn token(&self) -> &ValidatedToken {
        &self.token
    }

    pub fn claims(&self) -> &AccessClaims {
        self.token.claims()
    }

    /// The raw bearer token this context was built from.
    pub fn bearer(&self) -> &str {
        &self.bearer
    }

    pub fn user_id(&self) -> UserId {
        self.token.user_id()
    }

    pub fn session_id(&self) -> SessionId {
        self.token.session_id()
    }

    pub fn active_role(&self) -> Option<RoleClaim> {
        self.token.active_role()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims().expires_at()
    }
}
