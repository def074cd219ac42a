use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use helpdesk_core::{CompanyId, SessionId, UserId};

use crate::{AuthError, RoleClaim, RoleCode};

/// Access-token claims as carried on the wire.
///
/// Timestamps are unix seconds. `roles` is a snapshot of the user's
/// assignments at issuance; tokens minted before role claims existed may lack
/// it entirely, and tokens minted before role selection existed lack
/// `active_role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub sub: UserId,

    pub user_id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleClaim>>,
    #[serde(default)]
    pub companies: Vec<CompanyId>,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_role: Option<RoleClaim>,
}

impl AccessClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }

    /// Seconds until `exp`, clamped at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Distinct company ids referenced by a role snapshot, in first-seen order.
pub fn companies_of(roles: &[RoleClaim]) -> Vec<CompanyId> {
    let mut companies = Vec::new();
    for company in roles.iter().filter_map(RoleClaim::company_id) {
        if !companies.contains(&company) {
            companies.push(company);
        }
    }
    companies
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated token variants
// ─────────────────────────────────────────────────────────────────────────────

/// A token that carries an explicit active role (strict authorization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoleToken {
    claims: AccessClaims,
    active_role: RoleClaim,
}

impl ActiveRoleToken {
    pub fn active_role(&self) -> RoleClaim {
        self.active_role
    }
}

/// A token issued before active-role selection existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyToken {
    claims: AccessClaims,
}

impl LegacyToken {
    /// The role snapshot, or `None` when the token predates role claims.
    pub fn roles(&self) -> Option<&[RoleClaim]> {
        self.claims.roles.as_deref()
    }
}

/// A verified access token, classified once at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedToken {
    ActiveRole(ActiveRoleToken),
    Legacy(LegacyToken),
}

impl ValidatedToken {
    pub fn claims(&self) -> &AccessClaims {
        match self {
            ValidatedToken::ActiveRole(t) => &t.claims,
            ValidatedToken::Legacy(t) => &t.claims,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.claims().sub
    }

    pub fn session_id(&self) -> SessionId {
        self.claims().session_id
    }

    pub fn active_role(&self) -> Option<RoleClaim> {
        match self {
            ValidatedToken::ActiveRole(t) => Some(t.active_role),
            ValidatedToken::Legacy(_) => None,
        }
    }

    /// Role snapshot carried by the token (empty if the claim is absent).
    pub fn roles(&self) -> &[RoleClaim] {
        self.claims().roles.as_deref().unwrap_or(&[])
    }

    pub fn holds(&self, code: RoleCode) -> bool {
        self.roles().iter().any(|r| r.code() == code)
    }
}

impl TryFrom<AccessClaims> for ValidatedToken {
    type Error = AuthError;

    /// Rejects tokens whose identity claims disagree or whose active role is
    /// not part of their own role snapshot.
    fn try_from(claims: AccessClaims) -> Result<Self, Self::Error> {
        if claims.sub != claims.user_id {
            return Err(AuthError::TokenInvalid);
        }

        match claims.active_role {
            Some(active_role) => {
                let in_snapshot = claims
                    .roles
                    .as_deref()
                    .is_some_and(|roles| roles.contains(&active_role));
                if !in_snapshot {
                    return Err(AuthError::TokenInvalid);
                }
                Ok(ValidatedToken::ActiveRole(ActiveRoleToken {
                    claims,
                    active_role,
                }))
            }
            None => Ok(ValidatedToken::Legacy(LegacyToken { claims })),
        }
    }
}
