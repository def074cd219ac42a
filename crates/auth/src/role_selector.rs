//! Active-role selection.
//!
//! A user holding several role/company pairings picks one to act as; the
//! choice is recorded in a reissued access token for the same session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use helpdesk_core::CompanyId;

use crate::user::effective_roles;
use crate::{
    AuthError, AuthResult, IssuedAccessToken, RoleAssignment, RoleClaim, RoleCode, TokenIssuer,
    User, ValidatedToken,
};

/// Role selection as submitted by a client. Fields stay untyped so malformed
/// input can be reported per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelectionRequest {
    #[serde(default)]
    pub role_code: String,
    #[serde(default)]
    pub company_id: Option<String>,
}

impl RoleSelectionRequest {
    pub fn new(role_code: impl Into<String>, company_id: Option<CompanyId>) -> Self {
        Self {
            role_code: role_code.into(),
            company_id: company_id.map(|c| c.to_string()),
        }
    }

    /// Parse into a well-formed [`RoleClaim`]; says nothing about whether the
    /// user holds it.
    pub fn parse(&self) -> AuthResult<RoleClaim> {
        let raw_code = self.role_code.trim();
        if raw_code.is_empty() {
            return Err(AuthError::invalid_role_request(
                "role_code",
                "role_code is required",
            ));
        }
        let code: RoleCode = raw_code
            .parse()
            .map_err(|e: helpdesk_core::DomainError| {
                AuthError::invalid_role_request("role_code", e.to_string())
            })?;

        let company = match self.company_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<CompanyId>().map_err(|_| {
                AuthError::invalid_role_request("company_id", "company_id must be a valid UUID")
            })?),
            _ => None,
        };

        match (code.requires_company(), company) {
            (true, None) => Err(AuthError::invalid_role_request(
                "company_id",
                format!("company_id is required for {code}"),
            )),
            (false, Some(_)) => Err(AuthError::invalid_role_request(
                "company_id",
                format!("{code} must not carry a company_id"),
            )),
            _ => Ok(RoleClaim::new(code, company)?),
        }
    }
}

/// Roles a session may switch to, plus the one currently active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRoles {
    pub roles: Vec<RoleClaim>,
    pub active_role: Option<RoleClaim>,
}

#[derive(Debug, Clone)]
pub struct RoleSelector {
    issuer: TokenIssuer,
}

impl RoleSelector {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self { issuer }
    }

    /// Check `requested` against the user's active assignments.
    pub fn resolve(
        &self,
        assignments: &[RoleAssignment],
        requested: RoleClaim,
    ) -> AuthResult<RoleClaim> {
        let held = effective_roles(assignments);
        if held.contains(&requested) {
            return Ok(requested);
        }

        let code = requested.code();
        if code.requires_company() && held.iter().any(|r| r.code() == code) {
            Err(AuthError::CompanyContextMismatch)
        } else {
            Err(AuthError::RoleNotAssigned)
        }
    }

    /// Reissue the session's access token with a new active role.
    ///
    /// The presenting token's role snapshot and session id are kept. If the
    /// snapshot predates the requested role (assigned after login) it is
    /// rebuilt from the current assignments.
    pub fn select_role(
        &self,
        session: &ValidatedToken,
        user: &User,
        assignments: &[RoleAssignment],
        request: &RoleSelectionRequest,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedAccessToken> {
        if session.user_id() != user.id {
            return Err(AuthError::TokenInvalid);
        }

        let requested = request.parse()?;
        let active_role = self.resolve(assignments, requested)?;

        let snapshot = session.roles();
        let roles = if snapshot.contains(&active_role) {
            snapshot.to_vec()
        } else {
            effective_roles(assignments)
        };

        let issued =
            self.issuer
                .issue_with_roles(user, roles, session.session_id(), active_role, now)?;
        tracing::info!(
            user_id = %user.id,
            session_id = %session.session_id(),
            active_role = %active_role,
            "active role selected"
        );
        Ok(issued)
    }

    pub fn available_roles(
        &self,
        session: &ValidatedToken,
        assignments: &[RoleAssignment],
    ) -> AvailableRoles {
        AvailableRoles {
            roles: effective_roles(assignments),
            active_role: session.active_role(),
        }
    }
}

#[cfg(test)]
mod tests {
    use helpdesk_core::UserId;

    use super::*;
    use crate::JwtConfig;

    struct Fixture {
        selector: RoleSelector,
        issuer: TokenIssuer,
        user: User,
    }

    fn fixture() -> Fixture {
        let issuer = TokenIssuer::from_config(&JwtConfig::new("selector-test-secret"));
        Fixture {
            selector: RoleSelector::new(issuer.clone()),
            issuer,
            user: User::new(UserId::new(), "multi@example.com"),
        }
    }

    fn session(f: &Fixture, assignments: &[RoleAssignment]) -> ValidatedToken {
        let issued = f
            .issuer
            .issue_access_token(&f.user, assignments, None, None, Utc::now())
            .unwrap();
        ValidatedToken::try_from(issued.claims).unwrap()
    }

    #[test]
    fn switches_between_companies_keeping_session() {
        let f = fixture();
        let (a, b) = (CompanyId::new(), CompanyId::new());
        let assignments = [
            RoleAssignment::active(RoleClaim::agent(a)),
            RoleAssignment::active(RoleClaim::agent(b)),
        ];
        let current = session(&f, &assignments);

        let issued = f
            .selector
            .select_role(
                &current,
                &f.user,
                &assignments,
                &RoleSelectionRequest::new("AGENT", Some(b)),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(issued.active_role(), Some(RoleClaim::agent(b)));
        assert_eq!(issued.claims.session_id, current.session_id());
        assert_eq!(issued.claims.roles.as_deref(), Some(current.roles()));
    }

    #[test]
    fn company_scoped_role_requires_company() {
        let f = fixture();
        let assignments = [RoleAssignment::active(RoleClaim::agent(CompanyId::new()))];
        let current = session(&f, &assignments);

        let err = f
            .selector
            .select_role(
                &current,
                &f.user,
                &assignments,
                &RoleSelectionRequest::new("AGENT", None),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidRoleRequest {
                field: "company_id",
                ..
            }
        ));
    }

    #[test]
    fn global_roles_reject_company() {
        let f = fixture();
        let assignments = [RoleAssignment::active(RoleClaim::platform_admin())];
        let current = session(&f, &assignments);

        for code in ["PLATFORM_ADMIN", "USER"] {
            let err = f
                .selector
                .select_role(
                    &current,
                    &f.user,
                    &assignments,
                    &RoleSelectionRequest::new(code, Some(CompanyId::new())),
                    Utc::now(),
                )
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_ROLE_REQUEST");
        }
    }

    #[test]
    fn unknown_role_code_and_bad_company_are_malformed() {
        let bad_code = RoleSelectionRequest {
            role_code: "SUPERUSER".into(),
            company_id: None,
        };
        assert!(matches!(
            bad_code.parse().unwrap_err(),
            AuthError::InvalidRoleRequest {
                field: "role_code",
                ..
            }
        ));

        let bad_company = RoleSelectionRequest {
            role_code: "AGENT".into(),
            company_id: Some("not-a-uuid".into()),
        };
        assert!(matches!(
            bad_company.parse().unwrap_err(),
            AuthError::InvalidRoleRequest {
                field: "company_id",
                ..
            }
        ));

        assert!(RoleSelectionRequest::default().parse().is_err());
    }

    #[test]
    fn role_not_held_anywhere() {
        let f = fixture();
        let assignments = [RoleAssignment::active(RoleClaim::user())];
        let current = session(&f, &assignments);

        let err = f
            .selector
            .select_role(
                &current,
                &f.user,
                &assignments,
                &RoleSelectionRequest::new("PLATFORM_ADMIN", None),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, AuthError::RoleNotAssigned);
    }

    #[test]
    fn role_held_in_another_company() {
        let f = fixture();
        let assignments = [RoleAssignment::active(RoleClaim::agent(CompanyId::new()))];
        let current = session(&f, &assignments);

        let err = f
            .selector
            .select_role(
                &current,
                &f.user,
                &assignments,
                &RoleSelectionRequest::new("AGENT", Some(CompanyId::new())),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, AuthError::CompanyContextMismatch);
    }

    #[test]
    fn inactive_assignment_cannot_be_selected() {
        let f = fixture();
        let company = CompanyId::new();
        let assignments = [
            RoleAssignment::active(RoleClaim::user()),
            RoleAssignment::inactive(RoleClaim::company_admin(company)),
        ];
        let current = session(&f, &assignments);

        let err = f
            .selector
            .select_role(
                &current,
                &f.user,
                &assignments,
                &RoleSelectionRequest::new("COMPANY_ADMIN", Some(company)),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, AuthError::RoleNotAssigned);
    }

    #[test]
    fn newly_assigned_role_rebuilds_snapshot() {
        let f = fixture();
        let company = CompanyId::new();
        let current = session(&f, &[RoleAssignment::active(RoleClaim::user())]);
        let now_assigned = [
            RoleAssignment::active(RoleClaim::user()),
            RoleAssignment::active(RoleClaim::company_admin(company)),
        ];

        let issued = f
            .selector
            .select_role(
                &current,
                &f.user,
                &now_assigned,
                &RoleSelectionRequest::new("COMPANY_ADMIN", Some(company)),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(
            issued.claims.roles,
            Some(vec![RoleClaim::user(), RoleClaim::company_admin(company)])
        );
        assert_eq!(issued.claims.companies, vec![company]);
    }

    #[test]
    fn available_roles_reports_active_role() {
        let f = fixture();
        let company = CompanyId::new();
        let assignments = [
            RoleAssignment::active(RoleClaim::agent(company)),
            RoleAssignment::active(RoleClaim::company_admin(CompanyId::new())),
        ];
        let current = session(&f, &assignments);

        let available = f.selector.available_roles(&current, &assignments);
        assert_eq!(available.roles.len(), 2);
        assert_eq!(available.active_role, Some(RoleClaim::agent(company)));
    }
}
