//! User identity and role assignments as seen by the session core.
//!
//! The account itself is owned elsewhere (user management); this crate only
//! needs identity, status and the role assignments that feed token claims.

use serde::{Deserialize, Serialize};

use helpdesk_core::UserId;

use crate::RoleClaim;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// User was deactivated and cannot authenticate.
    Inactive,
    /// User is suspended and cannot authenticate.
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UserStatus {
    type Err = helpdesk_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            "SUSPENDED" => Ok(UserStatus::Suspended),
            other => Err(helpdesk_core::DomainError::validation(format!(
                "unknown user status '{other}'"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub status: UserStatus,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            status: UserStatus::Active,
        }
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role assignments
// ─────────────────────────────────────────────────────────────────────────────

/// A role granted to a user, possibly soft-disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: RoleClaim,
    pub active: bool,
}

impl RoleAssignment {
    pub fn active(role: RoleClaim) -> Self {
        Self { role, active: true }
    }

    pub fn inactive(role: RoleClaim) -> Self {
        Self {
            role,
            active: false,
        }
    }
}

/// Roles a user can currently act as, in assignment order.
///
/// Inactive assignments are skipped and duplicates collapsed. A user with no
/// active assignment at all is treated as a plain `USER`.
pub fn effective_roles(assignments: &[RoleAssignment]) -> Vec<RoleClaim> {
    let mut roles: Vec<RoleClaim> = Vec::with_capacity(assignments.len());
    for assignment in assignments.iter().filter(|a| a.active) {
        if !roles.contains(&assignment.role) {
            roles.push(assignment.role);
        }
    }

    if roles.is_empty() {
        roles.push(RoleClaim::user());
    }
    roles
}
