use chrono::{DateTime, Utc};
use serde::Serialize;

use helpdesk_core::SessionId;

use crate::claims::companies_of;
use crate::user::effective_roles;
use crate::{
    AccessClaims, AuthError, AuthResult, DeviceInfo, JwtConfig, RefreshToken, RoleAssignment,
    RoleClaim, TokenCodec, User,
};

/// A freshly signed access token and the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedAccessToken {
    pub token: String,
    #[serde(skip)]
    pub claims: AccessClaims,
    /// Seconds until expiry.
    pub expires_in: i64,
}

impl IssuedAccessToken {
    pub fn active_role(&self) -> Option<RoleClaim> {
        self.claims.active_role
    }
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    codec: TokenCodec,
    config: JwtConfig,
}

impl TokenIssuer {
    pub fn new(codec: TokenCodec, config: JwtConfig) -> Self {
        Self { codec, config }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(TokenCodec::from_config(config), config.clone())
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Issue an access token from the user's current assignments.
    ///
    /// Without an explicit `active_role` the first effective role (assignment
    /// order) becomes active. A missing `session_id` starts a new session.
    pub fn issue_access_token(
        &self,
        user: &User,
        assignments: &[RoleAssignment],
        session_id: Option<SessionId>,
        active_role: Option<RoleClaim>,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedAccessToken> {
        let roles = effective_roles(assignments);
        let active_role = match active_role {
            Some(requested) if roles.contains(&requested) => requested,
            Some(_) => return Err(AuthError::RoleNotAssigned),
            None => roles[0],
        };

        self.issue_with_roles(
            user,
            roles,
            session_id.unwrap_or_default(),
            active_role,
            now,
        )
    }

    /// Issue an access token over an explicit role snapshot.
    pub fn issue_with_roles(
        &self,
        user: &User,
        roles: Vec<RoleClaim>,
        session_id: SessionId,
        active_role: RoleClaim,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedAccessToken> {
        if !roles.contains(&active_role) {
            return Err(AuthError::RoleNotAssigned);
        }

        let iat = now.timestamp();
        let exp = (now + self.config.access_ttl()).timestamp();
        let claims = AccessClaims {
            iss: self.config.issuer.clone(),
            aud: (!self.config.audience.is_empty()).then(|| self.config.audience.clone()),
            iat,
            exp,
            sub: user.id,
            user_id: user.id,
            email: user.email.clone(),
            companies: companies_of(&roles),
            roles: Some(roles),
            session_id,
            active_role: Some(active_role),
        };

        let token = self.codec.encode(&claims)?;
        tracing::debug!(
            user_id = %user.id,
            %session_id,
            active_role = %active_role,
            "access token issued"
        );
        Ok(IssuedAccessToken {
            token,
            claims,
            expires_in: exp - iat,
        })
    }

    /// Mint an opaque refresh token. The raw value is returned once; only its
    /// hash is on the record.
    pub fn issue_refresh_token(
        &self,
        user: &User,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> (String, RefreshToken) {
        RefreshToken::issue(user.id, device, self.config.refresh_ttl(), now)
    }
}
