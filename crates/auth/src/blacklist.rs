//! Revocation list for access tokens that have not yet expired.
//!
//! Entries are keyed by session id, so every access token minted for a session
//! (including role-switch reissues) is revoked together. A per-user entry
//! records the instant of a "logout everywhere": tokens issued at or before it
//! are dead.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use helpdesk_core::{SessionId, UserId};

use crate::AuthError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("blacklist backend error: {0}")]
    Backend(String),
}

impl From<BlacklistError> for AuthError {
    fn from(value: BlacklistError) -> Self {
        AuthError::Unavailable(value.to_string())
    }
}

/// Shared TTL'd revocation store.
///
/// Implementations must self-expire entries after `ttl`. A non-positive `ttl`
/// means the token is already dead and nothing needs to be written.
#[async_trait::async_trait]
pub trait Blacklist: Send + Sync {
    async fn revoke(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError>;

    /// When the session was revoked, if it is still on the list.
    async fn revoked_at(&self, session_id: SessionId)
    -> Result<Option<DateTime<Utc>>, BlacklistError>;

    async fn contains(&self, session_id: SessionId) -> Result<bool, BlacklistError> {
        Ok(self.revoked_at(session_id).await?.is_some())
    }

    async fn revoke_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError>;

    async fn user_revoked_at(&self, user_id: UserId)
    -> Result<Option<DateTime<Utc>>, BlacklistError>;
}

#[async_trait::async_trait]
impl<T: Blacklist + ?Sized> Blacklist for Arc<T> {
    async fn revoke(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        (**self).revoke(session_id, revoked_at, ttl).await
    }

    async fn revoked_at(
        &self,
        session_id: SessionId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        (**self).revoked_at(session_id).await
    }

    async fn revoke_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        (**self).revoke_user(user_id, revoked_at, ttl).await
    }

    async fn user_revoked_at(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        (**self).user_revoked_at(user_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Entry {
    revoked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn live(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.expires_at > now).then_some(self.revoked_at)
    }
}

/// Single-process blacklist for tests and local development.
///
/// Expiry is evaluated against the wall clock; stale entries are pruned on
/// every write.
#[derive(Debug, Default)]
pub struct InMemoryBlacklist {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    users: RwLock<HashMap<UserId, Entry>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .map(|m| m.values().filter(|e| e.live(now).is_some()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> BlacklistError {
    BlacklistError::Backend("lock poisoned".to_string())
}

fn insert<K: Eq + core::hash::Hash>(
    map: &RwLock<HashMap<K, Entry>>,
    key: K,
    revoked_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<(), BlacklistError> {
    if ttl <= Duration::zero() {
        return Ok(());
    }
    let now = Utc::now();
    let mut guard = map.write().map_err(|_| poisoned())?;
    guard.retain(|_, e| e.expires_at > now);
    guard.insert(
        key,
        Entry {
            revoked_at,
            expires_at: now + ttl,
        },
    );
    Ok(())
}

fn lookup<K: Eq + core::hash::Hash>(
    map: &RwLock<HashMap<K, Entry>>,
    key: &K,
) -> Result<Option<DateTime<Utc>>, BlacklistError> {
    let guard = map.read().map_err(|_| poisoned())?;
    Ok(guard.get(key).and_then(|e| e.live(Utc::now())))
}

#[async_trait::async_trait]
impl Blacklist for InMemoryBlacklist {
    async fn revoke(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        insert(&self.sessions, session_id, revoked_at, ttl)
    }

    async fn revoked_at(
        &self,
        session_id: SessionId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        lookup(&self.sessions, &session_id)
    }

    async fn revoke_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        insert(&self.users, user_id, revoked_at, ttl)
    }

    async fn user_revoked_at(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        lookup(&self.users, &user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_session_is_visible_immediately() {
        let blacklist = InMemoryBlacklist::new();
        let session = SessionId::new();
        let now = Utc::now();

        assert!(!blacklist.contains(session).await.unwrap());
        blacklist
            .revoke(session, now, Duration::minutes(10))
            .await
            .unwrap();

        assert!(blacklist.contains(session).await.unwrap());
        assert_eq!(blacklist.revoked_at(session).await.unwrap(), Some(now));
        assert!(!blacklist.contains(SessionId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn non_positive_ttl_is_not_written() {
        let blacklist = InMemoryBlacklist::new();
        let session = SessionId::new();

        blacklist
            .revoke(session, Utc::now(), Duration::zero())
            .await
            .unwrap();
        blacklist
            .revoke(session, Utc::now(), Duration::seconds(-5))
            .await
            .unwrap();

        assert!(blacklist.is_empty());
        assert!(!blacklist.contains(session).await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let blacklist = InMemoryBlacklist::new();
        let session = SessionId::new();
        blacklist
            .revoke(session, Utc::now(), Duration::milliseconds(20))
            .await
            .unwrap();
        assert!(blacklist.contains(session).await.unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(!blacklist.contains(session).await.unwrap());
    }

    #[tokio::test]
    async fn user_entries_are_separate_from_sessions() {
        let blacklist = Arc::new(InMemoryBlacklist::new());
        let user = UserId::new();
        let at = Utc::now();

        blacklist
            .revoke_user(user, at, Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(blacklist.user_revoked_at(user).await.unwrap(), Some(at));
        assert_eq!(blacklist.user_revoked_at(UserId::new()).await.unwrap(), None);
        assert!(blacklist.is_empty());
    }
}
