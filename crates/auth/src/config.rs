//! Token lifecycle configuration.
//!
//! Loaded from `JWT_*` environment variables by the binary; every field except
//! the secret has a default so tests can build one with [`JwtConfig::new`].

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Symmetric signing algorithms accepted for access tokens.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SigningAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::HS384 => "HS384",
            SigningAlgorithm::HS512 => "HS512",
        }
    }
}

impl core::str::FromStr for SigningAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::HS256),
            "HS384" => Ok(SigningAlgorithm::HS384),
            "HS512" => Ok(SigningAlgorithm::HS512),
            _ => Err(ConfigError::Invalid {
                key: "JWT_ALGORITHM",
                value: s.to_string(),
            }),
        }
    }
}

impl From<SigningAlgorithm> for jsonwebtoken::Algorithm {
    fn from(value: SigningAlgorithm) -> Self {
        match value {
            SigningAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            SigningAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            SigningAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    #[serde(skip_serializing)]
    pub secret: String,
    pub algorithm: SigningAlgorithm,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub issuer: String,
    pub audience: String,
    pub required_claims: Vec<String>,
    pub leeway_seconds: i64,
    pub blacklist_enabled: bool,
    /// A just-blacklisted session keeps passing validation for this long.
    pub blacklist_grace_period_seconds: i64,
    /// How long after expiry an access token may still identify its subject
    /// to the refresh workflow.
    pub expired_token_grace_seconds: i64,
    /// How long a rotated refresh token is still honoured.
    pub rotation_grace_seconds: i64,
    /// Revoke every session of a user who replays a rotated refresh token.
    pub revoke_on_reuse: bool,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: SigningAlgorithm::HS256,
            access_ttl_minutes: 60,
            refresh_ttl_minutes: 43_200,
            issuer: "helpdesk".to_string(),
            audience: "helpdesk-clients".to_string(),
            required_claims: ["iss", "iat", "exp", "sub"]
                .into_iter()
                .map(String::from)
                .collect(),
            leeway_seconds: 0,
            blacklist_enabled: true,
            blacklist_grace_period_seconds: 0,
            expired_token_grace_seconds: 300,
            rotation_grace_seconds: 0,
            revoke_on_reuse: true,
        }
    }
}

impl core::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_minutes", &self.refresh_ttl_minutes)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("required_claims", &self.required_claims)
            .field("leeway_seconds", &self.leeway_seconds)
            .field("blacklist_enabled", &self.blacklist_enabled)
            .field(
                "blacklist_grace_period_seconds",
                &self.blacklist_grace_period_seconds,
            )
            .field(
                "expired_token_grace_seconds",
                &self.expired_token_grace_seconds,
            )
            .field("rotation_grace_seconds", &self.rotation_grace_seconds)
            .field("revoke_on_reuse", &self.revoke_on_reuse)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, test maps, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let mut config = Self::new(secret);

        if let Some(v) = lookup("JWT_ALGORITHM") {
            config.algorithm = v.parse()?;
        }
        if let Some(v) = lookup("JWT_ISSUER") {
            config.issuer = v;
        }
        if let Some(v) = lookup("JWT_AUDIENCE") {
            config.audience = v;
        }
        if let Some(v) = lookup("JWT_REQUIRED_CLAIMS") {
            config.required_claims = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        config.access_ttl_minutes = parse_or(&lookup, "JWT_TTL", config.access_ttl_minutes)?;
        config.refresh_ttl_minutes =
            parse_or(&lookup, "JWT_REFRESH_TTL", config.refresh_ttl_minutes)?;
        config.leeway_seconds = parse_or(&lookup, "JWT_LEEWAY", config.leeway_seconds)?;
        config.blacklist_enabled =
            parse_or(&lookup, "JWT_BLACKLIST_ENABLED", config.blacklist_enabled)?;
        config.blacklist_grace_period_seconds = parse_or(
            &lookup,
            "JWT_BLACKLIST_GRACE_PERIOD",
            config.blacklist_grace_period_seconds,
        )?;
        config.expired_token_grace_seconds = parse_or(
            &lookup,
            "JWT_EXPIRED_TOKEN_GRACE",
            config.expired_token_grace_seconds,
        )?;
        config.rotation_grace_seconds =
            parse_or(&lookup, "JWT_ROTATION_GRACE", config.rotation_grace_seconds)?;
        config.revoke_on_reuse = parse_or(&lookup, "JWT_REVOKE_ON_REUSE", config.revoke_on_reuse)?;

        if config.access_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_TTL",
                value: config.access_ttl_minutes.to_string(),
            });
        }
        if config.refresh_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_REFRESH_TTL",
                value: config.refresh_ttl_minutes.to_string(),
            });
        }

        Ok(config)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::minutes(self.refresh_ttl_minutes)
    }

    pub fn leeway(&self) -> Duration {
        Duration::seconds(self.leeway_seconds)
    }

    pub fn expired_token_grace(&self) -> Duration {
        Duration::seconds(self.expired_token_grace_seconds)
    }

    pub fn rotation_grace(&self) -> Duration {
        Duration::seconds(self.rotation_grace_seconds)
    }

    pub fn blacklist_grace(&self) -> Duration {
        Duration::seconds(self.blacklist_grace_period_seconds)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
