//! Redis-backed token blacklist.
//!
//! ## Keys
//!
//! - `{prefix}:session:{session_id}` → unix seconds of revocation, `EX ttl`
//! - `{prefix}:user:{user_id}` → unix seconds of a "logout everywhere"
//!
//! Entries self-expire, so the list never needs sweeping. Every instance
//! shares the same keys, which makes a logout visible cluster-wide.

use chrono::{DateTime, Duration, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use tracing::instrument;

use helpdesk_auth::{Blacklist, BlacklistError};
use helpdesk_core::{SessionId, UserId};

const DEFAULT_PREFIX: &str = "helpdesk:blacklist";

#[derive(Clone)]
pub struct RedisBlacklist {
    conn: MultiplexedConnection,
    prefix: String,
}

impl core::fmt::Debug for RedisBlacklist {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisBlacklist")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn backend(err: redis::RedisError) -> BlacklistError {
    BlacklistError::Backend(err.to_string())
}

impl RedisBlacklist {
    /// Connect to `redis_url` (e.g. `redis://localhost:6379`).
    pub async fn connect(
        redis_url: impl AsRef<str>,
        prefix: Option<String>,
    ) -> Result<Self, BlacklistError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        Ok(Self {
            conn,
            prefix: prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        })
    }

    fn session_key(&self, session_id: SessionId) -> String {
        session_key(&self.prefix, session_id)
    }

    fn user_key(&self, user_id: UserId) -> String {
        user_key(&self.prefix, user_id)
    }

    async fn set(
        &self,
        key: String,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        let Some(seconds) = ttl_seconds(ttl) else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(&key)
            .arg(revoked_at.timestamp())
            .arg("EX")
            .arg(seconds)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn get(&self, key: String) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(value.and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
    }
}

pub(crate) fn session_key(prefix: &str, session_id: SessionId) -> String {
    format!("{prefix}:session:{session_id}")
}

pub(crate) fn user_key(prefix: &str, user_id: UserId) -> String {
    format!("{prefix}:user:{user_id}")
}

/// Whole seconds for `EX`, rounding sub-second TTLs up. `None` if already dead.
pub(crate) fn ttl_seconds(ttl: Duration) -> Option<i64> {
    if ttl <= Duration::zero() {
        return None;
    }
    let secs = ttl.num_seconds();
    Some(if ttl > Duration::seconds(secs) { secs + 1 } else { secs })
}

#[async_trait::async_trait]
impl Blacklist for RedisBlacklist {
    #[instrument(skip(self), err)]
    async fn revoke(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        self.set(self.session_key(session_id), revoked_at, ttl).await
    }

    async fn revoked_at(
        &self,
        session_id: SessionId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        self.get(self.session_key(session_id)).await
    }

    async fn contains(&self, session_id: SessionId) -> Result<bool, BlacklistError> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS")
            .arg(self.session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(backend)
    }

    #[instrument(skip(self), err)]
    async fn revoke_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), BlacklistError> {
        self.set(self.user_key(user_id), revoked_at, ttl).await
    }

    async fn user_revoked_at(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, BlacklistError> {
        self.get(self.user_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let session = SessionId::new();
        let user = UserId::new();
        assert_eq!(
            session_key(DEFAULT_PREFIX, session),
            format!("helpdesk:blacklist:session:{session}")
        );
        assert_eq!(
            user_key("tenant-a", user),
            format!("tenant-a:user:{user}")
        );
    }

    #[test]
    fn ttl_rounds_up_and_skips_dead_tokens() {
        assert_eq!(ttl_seconds(Duration::zero()), None);
        assert_eq!(ttl_seconds(Duration::seconds(-3)), None);
        assert_eq!(ttl_seconds(Duration::milliseconds(200)), Some(1));
        assert_eq!(ttl_seconds(Duration::seconds(90)), Some(90));
        assert_eq!(ttl_seconds(Duration::milliseconds(90_500)), Some(91));
    }
}
