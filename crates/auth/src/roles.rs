use core::str::FromStr;

use serde::{Deserialize, Serialize};

use helpdesk_core::{CompanyId, DomainError};

/// The fixed set of role codes known to the platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCode {
    PlatformAdmin,
    CompanyAdmin,
    Agent,
    User,
}

impl RoleCode {
    pub const ALL: [RoleCode; 4] = [
        RoleCode::PlatformAdmin,
        RoleCode::CompanyAdmin,
        RoleCode::Agent,
        RoleCode::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleCode::PlatformAdmin => "PLATFORM_ADMIN",
            RoleCode::CompanyAdmin => "COMPANY_ADMIN",
            RoleCode::Agent => "AGENT",
            RoleCode::User => "USER",
        }
    }

    /// Company-scoped roles must always be held within a company.
    pub fn requires_company(&self) -> bool {
        matches!(self, RoleCode::CompanyAdmin | RoleCode::Agent)
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown role code '{s}' (expected one of PLATFORM_ADMIN, COMPANY_ADMIN, AGENT, USER)"
                ))
            })
    }
}

/// A role held in an optional company context.
///
/// Construction enforces the scoping invariant: `PLATFORM_ADMIN` and `USER`
/// never carry a company, `COMPANY_ADMIN` and `AGENT` always do. Deserialization
/// goes through the same check, so a claim that violates it never decodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRoleClaim")]
pub struct RoleClaim {
    code: RoleCode,
    company_id: Option<CompanyId>,
}

#[derive(Deserialize)]
struct RawRoleClaim {
    code: RoleCode,
    #[serde(default)]
    company_id: Option<CompanyId>,
}

impl TryFrom<RawRoleClaim> for RoleClaim {
    type Error = DomainError;

    fn try_from(raw: RawRoleClaim) -> Result<Self, Self::Error> {
        RoleClaim::new(raw.code, raw.company_id)
    }
}

impl RoleClaim {
    pub fn new(code: RoleCode, company_id: Option<CompanyId>) -> Result<Self, DomainError> {
        match (code.requires_company(), company_id) {
            (true, None) => Err(DomainError::invariant(format!(
                "{code} requires a company_id"
            ))),
            (false, Some(_)) => Err(DomainError::invariant(format!(
                "{code} must not carry a company_id"
            ))),
            _ => Ok(Self { code, company_id }),
        }
    }

    pub fn platform_admin() -> Self {
        Self {
            code: RoleCode::PlatformAdmin,
            company_id: None,
        }
    }

    pub fn user() -> Self {
        Self {
            code: RoleCode::User,
            company_id: None,
        }
    }

    pub fn company_admin(company_id: CompanyId) -> Self {
        Self {
            code: RoleCode::CompanyAdmin,
            company_id: Some(company_id),
        }
    }

    pub fn agent(company_id: CompanyId) -> Self {
        Self {
            code: RoleCode::Agent,
            company_id: Some(company_id),
        }
    }

    pub fn code(&self) -> RoleCode {
        self.code
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }
}

impl core::fmt::Display for RoleClaim {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.company_id {
            Some(company) => write!(f, "{}@{}", self.code, company),
            None => f.write_str(self.code.as_str()),
        }
    }
}
