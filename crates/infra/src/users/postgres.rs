//! Postgres-backed user directory.
//!
//! Passwords are stored as pgcrypto `crypt()` digests and checked inside the
//! database; the plaintext never round-trips back to the application.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use helpdesk_auth::{RepositoryError, RoleAssignment, RoleClaim, RoleCode, User, UserDirectory, UserStatus};
use helpdesk_core::{CompanyId, UserId};

use crate::db::{column_error, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: Arc<PgPool>,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create or update a user and replace its role assignments.
    ///
    /// Used to seed the bootstrap administrator; account management proper
    /// lives outside this service.
    #[instrument(skip(self, password, assignments), fields(user_id = %user.id), err)]
    pub async fn upsert_user(
        &self,
        user: &User,
        password: &str,
        assignments: &[RoleAssignment],
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_user", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, status)
            VALUES ($1, $2, crypt($3, gen_salt('bf')), $4)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                status = EXCLUDED.status
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(password)
        .bind(user.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_user", e))?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_user", e))?;

        for assignment in assignments {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_code, company_id, is_active)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(user.id.as_uuid())
            .bind(assignment.role.code().as_str())
            .bind(assignment.role.company_id().map(|c| *c.as_uuid()))
            .bind(assignment.active)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_user", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_user", e))?;
        Ok(())
    }

    /// Look a user up by email, whatever its status.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, status FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_email", e))?;

        row.as_ref().map(|r| user_from_row("find_by_email", r)).transpose()
    }
}

fn user_from_row(operation: &str, row: &PgRow) -> Result<User, RepositoryError> {
    let id: Uuid = row.try_get("id").map_err(|e| column_error(operation, e))?;
    let email: String = row.try_get("email").map_err(|e| column_error(operation, e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| column_error(operation, e))?;
    let status: UserStatus = status
        .parse()
        .map_err(|e| RepositoryError::Storage(format!("{operation}: {e}")))?;

    Ok(User::new(UserId::from_uuid(id), email).with_status(status))
}

fn assignment_from_row(row: &PgRow) -> Result<RoleAssignment, RepositoryError> {
    const OP: &str = "role_assignments";
    let code: String = row.try_get("role_code").map_err(|e| column_error(OP, e))?;
    let company: Option<Uuid> = row.try_get("company_id").map_err(|e| column_error(OP, e))?;
    let active: bool = row.try_get("is_active").map_err(|e| column_error(OP, e))?;

    let code: RoleCode = code
        .parse()
        .map_err(|e| RepositoryError::Storage(format!("{OP}: {e}")))?;
    let role = RoleClaim::new(code, company.map(CompanyId::from_uuid))
        .map_err(|e| RepositoryError::Storage(format!("{OP}: {e}")))?;

    Ok(RoleAssignment { role, active })
}

#[async_trait::async_trait]
impl UserDirectory for PostgresUserDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, status FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.as_ref().map(|r| user_from_row("find_by_id", r)).transpose()
    }

    #[instrument(skip(self, password), err)]
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, status
            FROM users
            WHERE lower(email) = lower($1)
              AND password_hash = crypt($2, password_hash)
            "#,
        )
        .bind(email)
        .bind(password)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("verify_credentials", e))?;

        row.as_ref()
            .map(|r| user_from_row("verify_credentials", r))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn role_assignments(&self, id: UserId) -> Result<Vec<RoleAssignment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT role_code, company_id, is_active
            FROM user_roles
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_assignments", e))?;

        rows.iter().map(assignment_from_row).collect()
    }
}
