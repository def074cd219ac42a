//! Postgres-backed refresh-token repository.
//!
//! The rotation compare-and-swap is a single conditional update:
//! `UPDATE ... WHERE id = $1 AND is_revoked = false RETURNING id`. Postgres
//! row locking guarantees that of two concurrent updates only one returns a
//! row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use helpdesk_auth::{RefreshToken, RefreshTokenRepository, RepositoryError, RevokeReason};
use helpdesk_core::{SessionId, UserId};

use crate::db::{column_error, map_sqlx_error};

const COLUMNS: &str = r#"
    id, user_id, token_hash, device_name, ip_address, user_agent, location,
    expires_at, last_used_at, created_at, is_revoked, revoked_at, revoke_reason,
    replaced_by
"#;

#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenRepository {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn from_row(operation: &str, row: &PgRow) -> Result<RefreshToken, RepositoryError> {
    let get_err = |e| column_error(operation, e);

    let revoke_reason: Option<String> = row.try_get("revoke_reason").map_err(get_err)?;
    let revoke_reason = revoke_reason
        .map(|r| r.parse::<RevokeReason>())
        .transpose()
        .map_err(|e| RepositoryError::Storage(format!("{operation}: {e}")))?;
    let replaced_by: Option<Uuid> = row.try_get("replaced_by").map_err(get_err)?;

    Ok(RefreshToken {
        id: SessionId::from_uuid(row.try_get("id").map_err(get_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(get_err)?),
        token_hash: row.try_get("token_hash").map_err(get_err)?,
        device_name: row.try_get("device_name").map_err(get_err)?,
        ip_address: row.try_get("ip_address").map_err(get_err)?,
        user_agent: row.try_get("user_agent").map_err(get_err)?,
        location: row.try_get("location").map_err(get_err)?,
        expires_at: row.try_get("expires_at").map_err(get_err)?,
        last_used_at: row.try_get("last_used_at").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        is_revoked: row.try_get("is_revoked").map_err(get_err)?,
        revoked_at: row.try_get("revoked_at").map_err(get_err)?,
        revoke_reason,
        replaced_by: replaced_by.map(SessionId::from_uuid),
    })
}

#[async_trait::async_trait]
impl RefreshTokenRepository for PostgresRefreshTokenRepository {
    #[instrument(skip(self, record), fields(session_id = %record.id, user_id = %record.user_id), err)]
    async fn insert(&self, record: &RefreshToken) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                id, user_id, token_hash, device_name, ip_address, user_agent, location,
                expires_at, last_used_at, created_at, is_revoked, revoked_at, revoke_reason,
                replaced_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(&record.token_hash)
        .bind(&record.device_name)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.location)
        .bind(record.expires_at)
        .bind(record.last_used_at)
        .bind(record.created_at)
        .bind(record.is_revoked)
        .bind(record.revoked_at)
        .bind(record.revoke_reason.map(|r| r.as_str()))
        .bind(record.replaced_by.map(|id| *id.as_uuid()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_hash", e))?;

        row.as_ref().map(|r| from_row("find_by_hash", r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: SessionId) -> Result<Option<RefreshToken>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM refresh_tokens WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.as_ref().map(|r| from_row("find_by_id", r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}
            FROM refresh_tokens
            WHERE user_id = $1 AND is_revoked = false AND expires_at > $2
            ORDER BY last_used_at DESC NULLS LAST, created_at DESC
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_for_user", e))?;

        rows.iter()
            .map(|r| from_row("list_active_for_user", r))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn revoke_if_active(
        &self,
        id: SessionId,
        reason: RevokeReason,
        replaced_by: Option<SessionId>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $2, revoke_reason = $3, replaced_by = $4
            WHERE id = $1 AND is_revoked = false
            RETURNING id
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(reason.as_str())
        .bind(replaced_by.map(|s| *s.as_uuid()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_if_active", e))?;

        Ok(row.is_some())
    }

    #[instrument(skip(self), err)]
    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $2, revoke_reason = $3
            WHERE user_id = $1 AND is_revoked = false
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(at)
        .bind(reason.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_all_for_user", e))?;

        Ok(result.rows_affected())
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("touch", e))?;
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_expired", e))?;
        Ok(result.rows_affected())
    }
}
