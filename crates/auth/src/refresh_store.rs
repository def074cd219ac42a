//! Refresh-token persistence and the rotation workflow.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

use helpdesk_core::{SessionId, UserId};

use crate::refresh::hash_refresh_token;
use crate::{
    AuthError, AuthResult, DeviceInfo, JwtConfig, RefreshToken, RepositoryError, RevokeReason,
    User, UserDirectory,
};

/// Storage for refresh-token records.
///
/// `revoke_if_active` is the compare-and-swap the rotation workflow relies
/// on: it must flip `is_revoked` atomically and report whether this call was
/// the one that did it.
#[async_trait::async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, record: &RefreshToken) -> Result<(), RepositoryError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, RepositoryError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<RefreshToken>, RepositoryError>;

    /// Unrevoked, unexpired records, most recently used first.
    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError>;

    async fn revoke_if_active(
        &self,
        id: SessionId,
        reason: RevokeReason,
        replaced_by: Option<SessionId>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Revoke every active record of a user; returns how many flipped.
    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError>;

    /// Physically remove records with `expires_at <= now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait::async_trait]
impl<T: RefreshTokenRepository + ?Sized> RefreshTokenRepository for Arc<T> {
    async fn insert(&self, record: &RefreshToken) -> Result<(), RepositoryError> {
        (**self).insert(record).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        (**self).find_by_hash(token_hash).await
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<RefreshToken>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        (**self).list_active_for_user(user_id, now).await
    }

    async fn revoke_if_active(
        &self,
        id: SessionId,
        reason: RevokeReason,
        replaced_by: Option<SessionId>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        (**self).revoke_if_active(id, reason, replaced_by, at).await
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        (**self).revoke_all_for_user(user_id, reason, at).await
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        (**self).touch(id, at).await
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        (**self).delete(id).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        (**self).delete_expired(now).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory repository
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenRepository {
    records: RwLock<HashMap<SessionId, RefreshToken>>,
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_err() -> RepositoryError {
    RepositoryError::Storage("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn insert(&self, record: &RefreshToken) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        if records.contains_key(&record.id) {
            return Err(RepositoryError::Duplicate(format!("refresh token {}", record.id)));
        }
        if records.values().any(|r| r.token_hash == record.token_hash) {
            return Err(RepositoryError::Duplicate("refresh token hash".to_string()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let records = self.records.read().map_err(|_| lock_err())?;
        Ok(records.values().find(|r| r.token_hash == token_hash).cloned())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<RefreshToken>, RepositoryError> {
        let records = self.records.read().map_err(|_| lock_err())?;
        Ok(records.get(&id).cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let records = self.records.read().map_err(|_| lock_err())?;
        let mut active: Vec<RefreshToken> = records
            .values()
            .filter(|r| r.user_id == user_id && r.is_valid(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(active)
    }

    async fn revoke_if_active(
        &self,
        id: SessionId,
        reason: RevokeReason,
        replaced_by: Option<SessionId>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        match records.get_mut(&id) {
            Some(record) if !record.is_revoked => {
                record.is_revoked = true;
                record.revoked_at = Some(at);
                record.revoke_reason = Some(reason);
                record.replaced_by = replaced_by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        let mut count = 0;
        for record in records
            .values_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            record.is_revoked = true;
            record.revoked_at = Some(at);
            record.revoke_reason = Some(reason);
            count += 1;
        }
        Ok(count)
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        if let Some(record) = records.get_mut(&id) {
            record.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        records.remove(&id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().map_err(|_| lock_err())?;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store service
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a successful rotation.
///
/// `raw` is `None` when a just-rotated token was accepted inside the grace
/// window: the caller gets the live successor session, but no second refresh
/// token is minted because the winning request already delivered it.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub raw: Option<String>,
    pub record: RefreshToken,
    pub user: User,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    directory: Arc<dyn UserDirectory>,
    ttl: Duration,
    rotation_grace: Duration,
    revoke_on_reuse: bool,
}

impl RefreshTokenStore {
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        directory: Arc<dyn UserDirectory>,
        config: &JwtConfig,
    ) -> Self {
        Self {
            repository,
            directory,
            ttl: config.refresh_ttl(),
            rotation_grace: config.rotation_grace(),
            revoke_on_reuse: config.revoke_on_reuse,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new session for `user`. The raw token is returned exactly once.
    #[instrument(skip_all, fields(user_id = %user.id), err)]
    pub async fn create(
        &self,
        user: &User,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> AuthResult<(String, RefreshToken)> {
        let (raw, record) = RefreshToken::issue(user.id, device, self.ttl, now);
        self.repository.insert(&record).await?;
        tracing::info!(session_id = %record.id, device = %record.device_name, "refresh token created");
        Ok((raw, record))
    }

    /// Exchange `old_raw` for a successor token.
    #[instrument(skip_all, err)]
    pub async fn rotate(
        &self,
        old_raw: &str,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> AuthResult<Rotation> {
        let record = self
            .repository
            .find_by_hash(&hash_refresh_token(old_raw))
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if record.is_expired(now) {
            return Err(AuthError::RefreshTokenExpired);
        }

        let user = self
            .directory
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if !user.is_active() {
            return Err(AuthError::UserInactive);
        }

        if record.is_revoked {
            return self.already_revoked(record, user, now).await;
        }

        let device = merge_device(device, &record);
        let (raw, successor) = RefreshToken::issue(user.id, &device, self.ttl, now);
        self.repository.insert(&successor).await?;

        let won = self
            .repository
            .revoke_if_active(record.id, RevokeReason::Rotated, Some(successor.id), now)
            .await?;
        if !won {
            self.repository.delete(successor.id).await?;
            return self.lost_race(record.id, user, now).await;
        }

        tracing::info!(
            user_id = %user.id,
            previous = %record.id,
            session_id = %successor.id,
            "refresh token rotated"
        );
        Ok(Rotation {
            raw: Some(raw),
            record: successor,
            user,
        })
    }

    /// A concurrent request rotated the same token between our read and our
    /// swap. Share its lineage inside the grace window, otherwise refuse
    /// without treating it as a replay.
    async fn lost_race(&self, id: SessionId, user: User, now: DateTime<Utc>) -> AuthResult<Rotation> {
        let current = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(AuthError::RefreshTokenRevoked)?;

        if let Some(rotation) = self.successor_within_grace(&current, &user, now).await? {
            return Ok(rotation);
        }
        tracing::info!(user_id = %user.id, session_id = %id, "lost refresh rotation race");
        Err(AuthError::RefreshTokenRevoked)
    }

    async fn already_revoked(
        &self,
        record: RefreshToken,
        user: User,
        now: DateTime<Utc>,
    ) -> AuthResult<Rotation> {
        if let Some(rotation) = self.successor_within_grace(&record, &user, now).await? {
            return Ok(rotation);
        }

        tracing::warn!(
            user_id = %user.id,
            session_id = %record.id,
            reason = record.revoke_reason.map(|r| r.as_str()).unwrap_or("unknown"),
            "revoked refresh token presented; possible replay"
        );
        if self.revoke_on_reuse {
            let revoked = self
                .repository
                .revoke_all_for_user(user.id, RevokeReason::SecurityBreach, now)
                .await?;
            tracing::warn!(user_id = %user.id, revoked, "all sessions revoked after refresh token reuse");
        }
        Err(AuthError::RefreshTokenRevoked)
    }

    async fn successor_within_grace(
        &self,
        record: &RefreshToken,
        user: &User,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<Rotation>> {
        if !record.within_rotation_grace(self.rotation_grace, now) {
            return Ok(None);
        }
        let Some(successor_id) = record.replaced_by else {
            return Ok(None);
        };
        match self.repository.find_by_id(successor_id).await? {
            Some(successor) if successor.is_valid(now) => {
                self.repository.touch(successor.id, now).await?;
                tracing::debug!(session_id = %successor.id, "rotated token accepted within grace");
                Ok(Some(Rotation {
                    raw: None,
                    record: successor,
                    user: user.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Returns whether the record was active and is now revoked.
    #[instrument(skip(self), err)]
    pub async fn revoke(
        &self,
        id: SessionId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        Ok(self.repository.revoke_if_active(id, reason, None, now).await?)
    }

    /// Revoke the record behind a raw token; returns it if it existed.
    #[instrument(skip(self, raw), err)]
    pub async fn revoke_by_raw(
        &self,
        raw: &str,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>> {
        let Some(record) = self.find_by_raw(raw).await? else {
            return Ok(None);
        };
        self.repository
            .revoke_if_active(record.id, reason, None, now)
            .await?;
        Ok(Some(record))
    }

    #[instrument(skip(self), err)]
    pub async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let count = self
            .repository
            .revoke_all_for_user(user_id, reason, now)
            .await?;
        tracing::info!(%user_id, count, reason = %reason, "refresh tokens revoked");
        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn clean_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = self.repository.delete_expired(now).await?;
        if deleted > 0 {
            tracing::info!(deleted, "expired refresh tokens removed");
        }
        Ok(deleted)
    }

    pub async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<RefreshToken>> {
        Ok(self.repository.list_active_for_user(user_id, now).await?)
    }

    pub async fn find_by_id(&self, id: SessionId) -> AuthResult<Option<RefreshToken>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_by_raw(&self, raw: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self
            .repository
            .find_by_hash(&hash_refresh_token(raw))
            .await?)
    }
}

/// Device metadata for a successor: what the client sent now, falling back to
/// what the previous record knew.
fn merge_device(device: &DeviceInfo, previous: &RefreshToken) -> DeviceInfo {
    DeviceInfo {
        device_name: device
            .device_name
            .clone()
            .or_else(|| device.user_agent.is_none().then(|| previous.device_name.clone())),
        ip_address: device.ip_address.clone().or_else(|| previous.ip_address.clone()),
        user_agent: device.user_agent.clone().or_else(|| previous.user_agent.clone()),
        location: device.location.clone().or_else(|| previous.location.clone()),
    }
}
