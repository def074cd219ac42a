//! Refresh-token records and the primitives that mint and hash them.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use helpdesk_core::{SessionId, UserId};

/// Number of random bytes behind each refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Generate a raw refresh token: 32 bytes from the OS CSPRNG, hex encoded.
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest of a raw refresh token. Only this is ever persisted.
pub fn hash_refresh_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Device metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Client metadata captured when a session is opened or rotated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

impl DeviceInfo {
    pub fn new(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            device_name: None,
            ip_address,
            user_agent,
            location: None,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Explicit device name, falling back to one derived from the user agent.
    pub fn resolved_name(&self) -> String {
        match self.device_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => detect_device_name(self.user_agent.as_deref()),
        }
    }
}

/// Human readable device label from a user agent string.
pub fn detect_device_name(user_agent: Option<&str>) -> String {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => return "Unknown Device".to_string(),
    };

    if ua.contains("okhttp") {
        return "Mobile App - Android".to_string();
    }
    if ua.contains("CFNetwork") {
        return "Mobile App - iOS".to_string();
    }
    if ua.contains("Dart") {
        return "Mobile App - Flutter".to_string();
    }

    let lower = ua.to_ascii_lowercase();
    if ["bot", "crawler", "spider"].iter().any(|m| lower.contains(m)) {
        return format!("{} (Bot)", browser_of(ua).unwrap_or("Bot"));
    }

    if ua.contains("iPhone") {
        return "iPhone".to_string();
    }
    if ua.contains("iPad") {
        return "iPad".to_string();
    }
    if ua.contains("Android") {
        return if ua.contains("Mobile") {
            "Android Phone".to_string()
        } else {
            "Android Tablet".to_string()
        };
    }

    format!(
        "{} on {}",
        browser_of(ua).unwrap_or("Unknown Browser"),
        platform_of(ua).unwrap_or("Unknown OS")
    )
}

fn browser_of(ua: &str) -> Option<&'static str> {
    // Chromium derivatives advertise "Chrome" too; check them first.
    if ua.contains("Edg") {
        Some("Edge")
    } else if ua.contains("OPR") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Firefox") {
        Some("Firefox")
    } else if ua.contains("Chrome") {
        Some("Chrome")
    } else if ua.contains("Safari") {
        Some("Safari")
    } else {
        None
    }
}

fn platform_of(ua: &str) -> Option<&'static str> {
    if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Why a refresh token stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Rotated,
    ManualLogout,
    LogoutEverywhere,
    SessionRevoked,
    SecurityBreach,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Rotated => "rotated",
            RevokeReason::ManualLogout => "manual_logout",
            RevokeReason::LogoutEverywhere => "logout_everywhere",
            RevokeReason::SessionRevoked => "session_revoked",
            RevokeReason::SecurityBreach => "security_breach",
        }
    }
}

impl core::fmt::Display for RevokeReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RevokeReason {
    type Err = helpdesk_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotated" => Ok(RevokeReason::Rotated),
            "manual_logout" => Ok(RevokeReason::ManualLogout),
            "logout_everywhere" => Ok(RevokeReason::LogoutEverywhere),
            "session_revoked" => Ok(RevokeReason::SessionRevoked),
            "security_breach" => Ok(RevokeReason::SecurityBreach),
            other => Err(helpdesk_core::DomainError::validation(format!(
                "unknown revoke reason '{other}'"
            ))),
        }
    }
}

/// Lifecycle state derived from a record at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenState {
    Active,
    Rotated,
    Revoked(RevokeReason),
    Expired,
}

/// A persisted refresh token. The record id doubles as the session id of
/// every access token issued against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: SessionId,
    pub user_id: UserId,
    pub token_hash: String,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<RevokeReason>,
    pub replaced_by: Option<SessionId>,
}

impl RefreshToken {
    /// Mint a fresh token for `user_id`. Returns the raw value (hand it to the
    /// client once) and the record holding only its hash.
    pub fn issue(
        user_id: UserId,
        device: &DeviceInfo,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> (String, RefreshToken) {
        let raw = generate_refresh_secret();
        let record = RefreshToken {
            id: SessionId::new(),
            user_id,
            token_hash: hash_refresh_token(&raw),
            device_name: device.resolved_name(),
            ip_address: device.ip_address.clone(),
            user_agent: device.user_agent.clone(),
            location: device.location.clone(),
            expires_at: now + ttl,
            last_used_at: Some(now),
            created_at: now,
            is_revoked: false,
            revoked_at: None,
            revoke_reason: None,
            replaced_by: None,
        };
        (raw, record)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    pub fn matches(&self, raw: &str) -> bool {
        self.token_hash == hash_refresh_token(raw)
    }

    pub fn state(&self, now: DateTime<Utc>) -> RefreshTokenState {
        if self.is_revoked {
            match self.revoke_reason {
                Some(RevokeReason::Rotated) => RefreshTokenState::Rotated,
                Some(reason) => RefreshTokenState::Revoked(reason),
                None => RefreshTokenState::Revoked(RevokeReason::ManualLogout),
            }
        } else if self.is_expired(now) {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Active
        }
    }

    /// Whether this record was rotated less than `grace` ago.
    pub fn within_rotation_grace(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        self.revoke_reason == Some(RevokeReason::Rotated)
            && self.revoked_at.is_some_and(|at| now - at < grace)
    }
}
