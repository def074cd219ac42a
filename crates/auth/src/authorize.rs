use serde::Serialize;

use crate::user::effective_roles;
use crate::{AuthError, AuthResult, RoleCode, UserDirectory, ValidatedToken};

/// Outcome of a role check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
    /// A legacy token without any role claim; only the directory can say.
    NeedsDirectoryCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenyReason {
    pub kind: DenialKind,
    pub required: Vec<RoleCode>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// The token's active role is not among the required ones.
    ActiveRoleNotPermitted,
    /// None of the token's (or user's) roles matches.
    NoMatchingRole,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Allow → `Ok`, anything else → `Forbidden`.
    pub fn into_result(self) -> AuthResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AuthError::Forbidden(reason.message)),
            Decision::NeedsDirectoryCheck => Err(AuthError::Forbidden(
                "role membership could not be established".to_string(),
            )),
        }
    }
}

fn deny(kind: DenialKind, required: &[RoleCode], message: String) -> Decision {
    Decision::Deny(DenyReason {
        kind,
        required: required.to_vec(),
        message,
    })
}

fn required_list(required: &[RoleCode]) -> String {
    required
        .iter()
        .map(RoleCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decide whether `token` may access a resource requiring any of `required`.
///
/// - No IO
/// - Active-role tokens are checked strictly against the active role; the
///   rest of their role snapshot is never consulted.
/// - Legacy tokens match on any role in their snapshot.
/// - An empty `required` admits any authenticated identity.
pub fn authorize(token: &ValidatedToken, required: &[RoleCode]) -> Decision {
    if required.is_empty() {
        return Decision::Allow;
    }

    match token {
        ValidatedToken::ActiveRole(t) => {
            let active = t.active_role();
            if required.contains(&active.code()) {
                Decision::Allow
            } else {
                deny(
                    DenialKind::ActiveRoleNotPermitted,
                    required,
                    format!(
                        "active role {} is not permitted here (requires one of: {})",
                        active.code(),
                        required_list(required)
                    ),
                )
            }
        }
        ValidatedToken::Legacy(t) => match t.roles() {
            None => Decision::NeedsDirectoryCheck,
            Some(roles) if roles.iter().any(|r| required.contains(&r.code())) => Decision::Allow,
            Some(_) => deny(
                DenialKind::NoMatchingRole,
                required,
                format!("requires one of: {}", required_list(required)),
            ),
        },
    }
}

/// [`authorize`], resolving legacy tokens without role claims against the
/// user's current active assignments.
pub async fn authorize_with_directory(
    token: &ValidatedToken,
    required: &[RoleCode],
    directory: &dyn UserDirectory,
) -> AuthResult<Decision> {
    match authorize(token, required) {
        Decision::NeedsDirectoryCheck => {
            let assignments = directory.role_assignments(token.user_id()).await?;
            let held = effective_roles(&assignments);
            if held.iter().any(|r| required.contains(&r.code())) {
                Ok(Decision::Allow)
            } else {
                Ok(deny(
                    DenialKind::NoMatchingRole,
                    required,
                    format!("requires one of: {}", required_list(required)),
                ))
            }
        }
        decided => Ok(decided),
    }
}
