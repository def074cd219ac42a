//! `helpdesk-auth`: session tokens, refresh-token lifecycle and role-based
//! authorization.
//!
//! This crate is decoupled from HTTP. Storage is reached through the
//! [`Blacklist`], [`RefreshTokenRepository`] and [`UserDirectory`] traits;
//! in-memory implementations live here, network-backed ones in
//! `helpdesk-infra`.

pub mod authorize;
pub mod blacklist;
pub mod claims;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod issuer;
pub mod refresh;
pub mod refresh_store;
pub mod role_selector;
pub mod roles;
pub mod service;
pub mod session;
pub mod user;
pub mod validator;

pub use authorize::{authorize, authorize_with_directory, Decision, DenialKind, DenyReason};
pub use blacklist::{Blacklist, BlacklistError, InMemoryBlacklist};
pub use claims::{AccessClaims, ActiveRoleToken, LegacyToken, ValidatedToken};
pub use codec::TokenCodec;
pub use config::{ConfigError, JwtConfig, SigningAlgorithm};
pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use error::{AuthError, AuthResult, RepositoryError};
pub use issuer::{IssuedAccessToken, TokenIssuer};
pub use refresh::{DeviceInfo, RefreshToken, RefreshTokenState, RevokeReason};
pub use refresh_store::{
    InMemoryRefreshTokenRepository, RefreshTokenRepository, RefreshTokenStore, Rotation,
};
pub use role_selector::{AvailableRoles, RoleSelectionRequest, RoleSelector};
pub use roles::{RoleClaim, RoleCode};
pub use service::{AuthService, LogoutOutcome, SessionSummary, SessionTokens};
pub use session::SessionContext;
pub use user::{RoleAssignment, User, UserStatus};
pub use validator::TokenValidator;
