//! Access-token validation.
//!
//! Order matters: signature and claim shape first, then time, then the
//! blacklist. A token is only looked up in the blacklist once it is known to be
//! authentic and unexpired, and a blacklist failure is a denial.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::{AccessClaims, AuthError, AuthResult, Blacklist, JwtConfig, TokenCodec, ValidatedToken};

#[derive(Clone)]
pub struct TokenValidator {
    codec: TokenCodec,
    config: JwtConfig,
    blacklist: Arc<dyn Blacklist>,
}

impl core::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    pub fn new(codec: TokenCodec, config: JwtConfig, blacklist: Arc<dyn Blacklist>) -> Self {
        Self {
            codec,
            config,
            blacklist,
        }
    }

    pub fn from_config(config: &JwtConfig, blacklist: Arc<dyn Blacklist>) -> Self {
        Self::new(TokenCodec::from_config(config), config.clone(), blacklist)
    }

    /// Fully validate a presented access token.
    pub async fn validate_access_token(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<ValidatedToken> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::TokenMissing)?;

        let claims = self.verify(token, now)?;
        let validated = ValidatedToken::try_from(claims)?;
        self.check_revocation(validated.claims(), now).await?;
        Ok(validated)
    }

    /// Signature, shape, issuer/audience and time checks; no blacklist.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AuthResult<AccessClaims> {
        let claims = self.decode_checked(token)?;

        let leeway = self.config.leeway_seconds;
        if claims.iat > now.timestamp() + leeway {
            tracing::debug!(iat = claims.iat, "token issued in the future");
            return Err(AuthError::TokenInvalid);
        }
        if now.timestamp() > claims.exp + leeway {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Verify the signature but tolerate expiry, as long as the token expired
    /// no longer than the configured grace window ago.
    ///
    /// Only the refresh workflow may use this, to learn who is refreshing.
    pub fn decode_without_validation(&self, token: &str, now: DateTime<Utc>) -> Option<AccessClaims> {
        let claims = self.decode_checked(token).ok()?;
        let grace = self.config.expired_token_grace_seconds;
        if now.timestamp() > claims.exp + grace {
            tracing::debug!(exp = claims.exp, "expired token outside refresh grace");
            return None;
        }
        Some(claims)
    }

    /// Whether the token's session (or its user, by issue time) was revoked.
    pub async fn check_revocation(&self, claims: &AccessClaims, now: DateTime<Utc>) -> AuthResult<()> {
        if !self.config.blacklist_enabled {
            return Ok(());
        }

        let grace = self.config.blacklist_grace();
        // An entry stamped ahead of our clock counts as already revoked.
        let past_grace = |revoked_at: DateTime<Utc>| {
            let elapsed = now - revoked_at;
            grace <= Duration::zero() || elapsed < Duration::zero() || elapsed >= grace
        };

        if let Some(revoked_at) = self.blacklist.revoked_at(claims.session_id).await? {
            if past_grace(revoked_at) {
                return Err(AuthError::TokenBlacklisted);
            }
            tracing::debug!(session_id = %claims.session_id, "blacklisted session within grace");
        }

        if let Some(revoked_at) = self.blacklist.user_revoked_at(claims.sub).await? {
            if claims.iat <= revoked_at.timestamp() && past_grace(revoked_at) {
                return Err(AuthError::TokenBlacklisted);
            }
        }
        Ok(())
    }

    fn decode_checked(&self, token: &str) -> AuthResult<AccessClaims> {
        let payload: Map<String, Value> = self.codec.decode(token)?;

        for name in &self.config.required_claims {
            if payload.get(name).is_none_or(Value::is_null) {
                tracing::debug!(claim = %name, "required claim missing");
                return Err(AuthError::TokenInvalid);
            }
        }

        let claims: AccessClaims = serde_json::from_value(Value::Object(payload)).map_err(|e| {
            tracing::debug!(error = %e, "malformed token payload");
            AuthError::TokenInvalid
        })?;

        if claims.iss != self.config.issuer {
            return Err(AuthError::TokenInvalid);
        }
        if let Some(aud) = claims.aud.as_deref() {
            if !self.config.audience.is_empty() && aud != self.config.audience {
                return Err(AuthError::TokenInvalid);
            }
        }
        Ok(claims)
    }
}
