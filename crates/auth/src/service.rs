//! Session workflows: login, refresh, role switch, logout and session
//! management, composed from the lower-level token components.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use helpdesk_core::SessionId;

use crate::refresh::hash_refresh_token;
use crate::user::effective_roles;
use crate::{
    AuthError, AuthResult, AvailableRoles, Blacklist, DeviceInfo, IssuedAccessToken, JwtConfig,
    RefreshToken, RefreshTokenRepository, RefreshTokenStore, RevokeReason, RoleSelectionRequest,
    RoleSelector, SessionContext, TokenIssuer, TokenValidator, User, UserDirectory,
};

/// Extra lifetime on a per-user revocation beyond the access-token TTL.
const USER_REVOCATION_MARGIN_SECONDS: i64 = 300;

/// Tokens handed to a client after login or refresh.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access: IssuedAccessToken,
    /// `None` when a just-rotated refresh token was honoured inside the grace
    /// window; the client keeps the one it already received.
    pub refresh_token: Option<String>,
    pub refresh_expires_at: DateTime<Utc>,
    pub session_id: SessionId,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionSummary {
    fn from_record(record: RefreshToken, is_current: bool) -> Self {
        Self {
            id: record.id,
            device_name: record.device_name,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            location: record.location,
            last_used_at: record.last_used_at,
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutOutcome {
    /// Refresh tokens revoked by this logout.
    pub revoked_sessions: u64,
    pub everywhere: bool,
}

#[derive(Clone)]
pub struct AuthService {
    config: JwtConfig,
    issuer: TokenIssuer,
    validator: TokenValidator,
    selector: RoleSelector,
    refresh_tokens: RefreshTokenStore,
    blacklist: Arc<dyn Blacklist>,
    directory: Arc<dyn UserDirectory>,
}

impl AuthService {
    pub fn new(
        config: JwtConfig,
        directory: Arc<dyn UserDirectory>,
        refresh_repository: Arc<dyn RefreshTokenRepository>,
        blacklist: Arc<dyn Blacklist>,
    ) -> Self {
        let issuer = TokenIssuer::from_config(&config);
        Self {
            validator: TokenValidator::from_config(&config, blacklist.clone()),
            selector: RoleSelector::new(issuer.clone()),
            refresh_tokens: RefreshTokenStore::new(refresh_repository, directory.clone(), &config),
            issuer,
            blacklist,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login / refresh
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, password, device), err)]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> AuthResult<SessionTokens> {
        let user = self
            .directory
            .verify_credentials(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !user.is_active() {
            return Err(AuthError::UserInactive);
        }

        let assignments = self.directory.role_assignments(user.id).await?;
        let (raw, record) = self.refresh_tokens.create(&user, device, now).await?;
        let access = self
            .issuer
            .issue_access_token(&user, &assignments, Some(record.id), None, now)?;

        tracing::info!(user_id = %user.id, session_id = %record.id, "login succeeded");
        Ok(SessionTokens {
            access,
            refresh_token: Some(raw),
            refresh_expires_at: record.expires_at,
            session_id: record.id,
            user,
        })
    }

    /// Rotate a refresh token and issue a matching access token.
    ///
    /// A presented (possibly expired) access token must be authentic, expired
    /// no longer than the grace window ago, and belong to the refresh token's
    /// owner. Its active role carries over while the user still holds it.
    #[instrument(skip_all, err)]
    pub async fn refresh(
        &self,
        refresh_raw: Option<&str>,
        presented_access: Option<&str>,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> AuthResult<SessionTokens> {
        let raw = refresh_raw
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(AuthError::RefreshTokenMissing)?;

        let previous = match presented_access.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                let claims = self
                    .validator
                    .decode_without_validation(token, now)
                    .ok_or(AuthError::TokenInvalid)?;
                let record = self
                    .refresh_tokens
                    .find_by_raw(raw)
                    .await?
                    .ok_or(AuthError::TokenInvalid)?;
                if claims.sub != record.user_id {
                    tracing::warn!(
                        token_user = %claims.sub,
                        refresh_user = %record.user_id,
                        "access and refresh tokens belong to different users"
                    );
                    return Err(AuthError::TokenInvalid);
                }
                Some(claims)
            }
            None => None,
        };

        let rotation = self.refresh_tokens.rotate(raw, device, now).await?;
        let assignments = self.directory.role_assignments(rotation.user.id).await?;
        let held = effective_roles(&assignments);
        let active_role = previous
            .and_then(|c| c.active_role)
            .filter(|role| held.contains(role));

        let access = self.issuer.issue_access_token(
            &rotation.user,
            &assignments,
            Some(rotation.record.id),
            active_role,
            now,
        )?;

        Ok(SessionTokens {
            access,
            refresh_token: rotation.raw,
            refresh_expires_at: rotation.record.expires_at,
            session_id: rotation.record.id,
            user: rotation.user,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    async fn active_user(&self, session: &SessionContext) -> AuthResult<User> {
        let user = self
            .directory
            .find_by_id(session.user_id())
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if !user.is_active() {
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id()), err)]
    pub async fn select_role(
        &self,
        session: &SessionContext,
        request: &RoleSelectionRequest,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedAccessToken> {
        let user = self.active_user(session).await?;
        let assignments = self.directory.role_assignments(user.id).await?;
        self.selector
            .select_role(session.token(), &user, &assignments, request, now)
    }

    pub async fn available_roles(&self, session: &SessionContext) -> AuthResult<AvailableRoles> {
        let assignments = self.directory.role_assignments(session.user_id()).await?;
        Ok(self.selector.available_roles(session.token(), &assignments))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logout / sessions
    // ─────────────────────────────────────────────────────────────────────────

    async fn blacklist_session(
        &self,
        session_id: SessionId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        if self.config.blacklist_enabled {
            self.blacklist.revoke(session_id, now, ttl).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, session, refresh_raw), fields(user_id = %session.user_id()), err)]
    pub async fn logout(
        &self,
        session: &SessionContext,
        refresh_raw: Option<&str>,
        everywhere: bool,
        now: DateTime<Utc>,
    ) -> AuthResult<LogoutOutcome> {
        let user_id = session.user_id();
        let remaining = Duration::seconds(session.claims().remaining_seconds(now));
        self.blacklist_session(session.session_id(), remaining, now)
            .await?;

        let mut revoked = 0;
        if self
            .refresh_tokens
            .revoke(session.session_id(), RevokeReason::ManualLogout, now)
            .await?
        {
            revoked += 1;
        }

        if let Some(raw) = refresh_raw.map(str::trim).filter(|r| !r.is_empty()) {
            match self.refresh_tokens.find_by_raw(raw).await? {
                Some(record) if record.user_id == user_id => {
                    if self
                        .refresh_tokens
                        .revoke(record.id, RevokeReason::ManualLogout, now)
                        .await?
                    {
                        revoked += 1;
                    }
                }
                Some(_) => {
                    tracing::warn!(%user_id, "logout presented another user's refresh token");
                }
                None => {}
            }
        }

        if everywhere {
            revoked += self
                .refresh_tokens
                .revoke_all_for_user(user_id, RevokeReason::LogoutEverywhere, now)
                .await?;
            if self.config.blacklist_enabled {
                let ttl =
                    self.config.access_ttl() + Duration::seconds(USER_REVOCATION_MARGIN_SECONDS);
                self.blacklist.revoke_user(user_id, now, ttl).await?;
            }
        }

        tracing::info!(%user_id, everywhere, revoked, "logout");
        Ok(LogoutOutcome {
            revoked_sessions: revoked,
            everywhere,
        })
    }

    /// Active sessions of the session's user, flagging the one in use.
    pub async fn sessions(
        &self,
        session: &SessionContext,
        current_raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<SessionSummary>> {
        let current_hash = current_raw.map(hash_refresh_token);
        let records = self
            .refresh_tokens
            .list_active_for_user(session.user_id(), now)
            .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let is_current = record.id == session.session_id()
                    || current_hash.as_deref() == Some(record.token_hash.as_str());
                SessionSummary::from_record(record, is_current)
            })
            .collect())
    }

    /// Revoke one of the user's other sessions.
    #[instrument(skip(self, session, current_raw), fields(user_id = %session.user_id()), err)]
    pub async fn revoke_session(
        &self,
        session: &SessionContext,
        target: SessionId,
        current_raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let record = self
            .refresh_tokens
            .find_by_id(target)
            .await?
            .filter(|r| r.user_id == session.user_id())
            .ok_or_else(|| AuthError::NotFound("session not found".to_string()))?;

        let is_current = record.id == session.session_id()
            || current_raw.is_some_and(|raw| record.matches(raw));
        if is_current {
            return Err(AuthError::Conflict(
                "cannot revoke the current session; use logout instead".to_string(),
            ));
        }
        if !record.is_valid(now) {
            return Err(AuthError::NotFound("session already revoked".to_string()));
        }

        if !self
            .refresh_tokens
            .revoke(record.id, RevokeReason::SessionRevoked, now)
            .await?
        {
            return Err(AuthError::NotFound("session already revoked".to_string()));
        }
        self.blacklist_session(record.id, self.config.access_ttl(), now)
            .await?;

        tracing::info!(session_id = %record.id, "session revoked");
        Ok(())
    }

    pub async fn clean_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        self.refresh_tokens.clean_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use helpdesk_core::{CompanyId, UserId};

    use super::*;
    use crate::{
        InMemoryBlacklist, InMemoryRefreshTokenRepository, InMemoryUserDirectory, RoleAssignment,
        RoleClaim, TokenCodec, UserStatus,
    };

    struct Fixture {
        service: AuthService,
        directory: Arc<InMemoryUserDirectory>,
        user: User,
    }

    const PASSWORD: &str = "correct horse";

    fn fixture_with(assignments: Vec<RoleAssignment>) -> Fixture {
        let config = JwtConfig::new("service-test-secret");
        let directory = Arc::new(InMemoryUserDirectory::new());
        let user = User::new(UserId::new(), "person@example.com");
        directory
            .add_user(user.clone(), PASSWORD, assignments)
            .unwrap();

        Fixture {
            service: AuthService::new(
                config,
                directory.clone(),
                Arc::new(InMemoryRefreshTokenRepository::new()),
                Arc::new(InMemoryBlacklist::new()),
            ),
            directory,
            user,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(vec![])
    }

    async fn login(f: &Fixture, now: DateTime<Utc>) -> SessionTokens {
        f.service
            .login(&f.user.email, PASSWORD, &DeviceInfo::default(), now)
            .await
            .unwrap()
    }

    async fn context(f: &Fixture, token: &str, now: DateTime<Utc>) -> SessionContext {
        let validated = f
            .service
            .validator()
            .validate_access_token(Some(token), now)
            .await
            .unwrap();
        SessionContext::new(validated, token)
    }

    #[tokio::test]
    async fn login_issues_paired_tokens() {
        let f = fixture();
        let now = Utc::now();
        let tokens = login(&f, now).await;

        assert_eq!(tokens.access.claims.session_id, tokens.session_id);
        assert_eq!(tokens.access.active_role(), Some(RoleClaim::user()));
        assert!(tokens.refresh_token.is_some());
        assert_eq!(tokens.access.expires_in, 3600);
    }

    #[tokio::test]
    async fn login_rejects_bad_password_and_inactive_users() {
        let f = fixture();
        let err = f
            .service
            .login(&f.user.email, "wrong", &DeviceInfo::default(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        f.directory.set_status(f.user.id, UserStatus::Suspended).unwrap();
        let err = f
            .service
            .login(&f.user.email, PASSWORD, &DeviceInfo::default(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UserInactive);
    }

    #[tokio::test]
    async fn select_role_then_logout_blacklists_session() {
        let a = CompanyId::new();
        let f = fixture_with(vec![
            RoleAssignment::active(RoleClaim::agent(a)),
            RoleAssignment::active(RoleClaim::company_admin(a)),
        ]);
        let now = Utc::now();
        let tokens = login(&f, now).await;
        let session = context(&f, &tokens.access.token, now).await;

        let switched = f
            .service
            .select_role(
                &session,
                &RoleSelectionRequest::new("COMPANY_ADMIN", Some(a)),
                now,
            )
            .await
            .unwrap();
        assert_eq!(switched.active_role(), Some(RoleClaim::company_admin(a)));

        let switched_session = context(&f, &switched.token, now).await;
        f.service
            .logout(&switched_session, None, false, now)
            .await
            .unwrap();

        for token in [&tokens.access.token, &switched.token] {
            let err = f
                .service
                .validator()
                .validate_access_token(Some(token), now)
                .await
                .unwrap_err();
            assert_eq!(err, AuthError::TokenBlacklisted);
        }

        let raw = tokens.refresh_token.unwrap();
        let err = f
            .service
            .refresh(Some(&raw), None, &DeviceInfo::default(), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::RefreshTokenRevoked);
    }

    #[tokio::test]
    async fn refresh_carries_active_role_over() {
        let (a, b) = (CompanyId::new(), CompanyId::new());
        let f = fixture_with(vec![
            RoleAssignment::active(RoleClaim::agent(a)),
            RoleAssignment::active(RoleClaim::agent(b)),
        ]);
        let now = Utc::now();
        let tokens = login(&f, now).await;
        let session = context(&f, &tokens.access.token, now).await;
        let switched = f
            .service
            .select_role(&session, &RoleSelectionRequest::new("AGENT", Some(b)), now)
            .await
            .unwrap();

        let later = now + Duration::minutes(62);
        let refreshed = f
            .service
            .refresh(
                tokens.refresh_token.as_deref(),
                Some(&switched.token),
                &DeviceInfo::default(),
                later,
            )
            .await
            .unwrap();

        assert_eq!(refreshed.access.active_role(), Some(RoleClaim::agent(b)));
        assert_ne!(refreshed.session_id, tokens.session_id);
        assert!(refreshed.refresh_token.is_some());
    }

    #[tokio::test]
    async fn refresh_honours_expired_access_grace() {
        let f = fixture();
        let now = Utc::now();
        let expired_four_ago = now + Duration::minutes(60 + 4);
        let expired_six_ago = now + Duration::minutes(60 + 6);

        let tokens = login(&f, now).await;
        let err = f
            .service
            .refresh(
                tokens.refresh_token.as_deref(),
                Some(&tokens.access.token),
                &DeviceInfo::default(),
                expired_six_ago,
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenInvalid);

        let ok = f
            .service
            .refresh(
                tokens.refresh_token.as_deref(),
                Some(&tokens.access.token),
                &DeviceInfo::default(),
                expired_four_ago,
            )
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn refresh_rejects_another_users_access_token() {
        let f = fixture();
        let now = Utc::now();
        let tokens = login(&f, now).await;

        let stranger = User::new(UserId::new(), "stranger@example.com");
        let foreign = TokenIssuer::new(
            TokenCodec::from_config(f.service.config()),
            f.service.config().clone(),
        )
        .issue_access_token(&stranger, &[], None, None, now)
        .unwrap();

        let err = f
            .service
            .refresh(
                tokens.refresh_token.as_deref(),
                Some(&foreign.token),
                &DeviceInfo::default(),
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenInvalid);
    }

    #[tokio::test]
    async fn refresh_requires_a_token() {
        let f = fixture();
        for raw in [None, Some("")] {
            let err = f
                .service
                .refresh(raw, None, &DeviceInfo::default(), Utc::now())
                .await
                .unwrap_err();
            assert_eq!(err, AuthError::RefreshTokenMissing);
        }
    }

    #[tokio::test]
    async fn logout_everywhere_kills_every_session() {
        let f = fixture();
        let earlier = Utc::now() - Duration::seconds(5);
        let first = login(&f, earlier).await;
        let second = login(&f, earlier).await;
        let now = Utc::now();

        let session = context(&f, &first.access.token, now).await;
        let outcome = f.service.logout(&session, None, true, now).await.unwrap();
        assert!(outcome.everywhere);
        assert_eq!(outcome.revoked_sessions, 2);

        let err = f
            .service
            .validator()
            .validate_access_token(Some(&second.access.token), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenBlacklisted);
        assert!(f.service.sessions(&session, None, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_listing_and_revocation() {
        let f = fixture();
        let now = Utc::now();
        let here = login(&f, now).await;
        let elsewhere = login(&f, now).await;
        let session = context(&f, &here.access.token, now).await;

        let sessions = f.service.sessions(&session, None, now).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_current).count(), 1);

        let err = f
            .service
            .revoke_session(&session, here.session_id, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        f.service
            .revoke_session(&session, elsewhere.session_id, None, now)
            .await
            .unwrap();
        let err = f
            .service
            .validator()
            .validate_access_token(Some(&elsewhere.access.token), now)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenBlacklisted);

        let again = f
            .service
            .revoke_session(&session, elsewhere.session_id, None, now)
            .await
            .unwrap_err();
        assert!(matches!(again, AuthError::NotFound(_)));

        let unknown = f
            .service
            .revoke_session(&session, SessionId::new(), None, now)
            .await
            .unwrap_err();
        assert!(matches!(unknown, AuthError::NotFound(_)));
    }
}
