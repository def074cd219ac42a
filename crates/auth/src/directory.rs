//! User lookup seam.
//!
//! Account management lives outside this crate; the session core only needs
//! to resolve a user, check credentials at login and read the user's current
//! role assignments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

use helpdesk_core::UserId;

use crate::{RepositoryError, RoleAssignment, User, UserStatus};

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// The user owning `email` if `password` matches, whatever its status.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, RepositoryError>;

    /// All assignments, including inactive ones, in assignment order.
    async fn role_assignments(&self, id: UserId) -> Result<Vec<RoleAssignment>, RepositoryError>;
}

#[async_trait::async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, RepositoryError> {
        (**self).verify_credentials(email, password).await
    }

    async fn role_assignments(&self, id: UserId) -> Result<Vec<RoleAssignment>, RepositoryError> {
        (**self).role_assignments(id).await
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_digest: String,
    assignments: Vec<RoleAssignment>,
}

fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Directory backed by a map, for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, StoredUser>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(
        &self,
        user: User,
        password: &str,
        assignments: Vec<RoleAssignment>,
    ) -> Result<(), RepositoryError> {
        let mut users = self.write()?;
        let email_taken = users
            .values()
            .any(|u| u.user.email.eq_ignore_ascii_case(&user.email) && u.user.id != user.id);
        if email_taken {
            return Err(RepositoryError::Duplicate(format!("email {}", user.email)));
        }
        users.insert(
            user.id,
            StoredUser {
                user,
                password_digest: digest(password),
                assignments,
            },
        );
        Ok(())
    }

    pub fn set_status(&self, id: UserId, status: UserStatus) -> Result<(), RepositoryError> {
        let mut users = self.write()?;
        let stored = users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::Storage(format!("unknown user {id}")))?;
        stored.user.status = status;
        Ok(())
    }

    pub fn set_assignments(
        &self,
        id: UserId,
        assignments: Vec<RoleAssignment>,
    ) -> Result<(), RepositoryError> {
        let mut users = self.write()?;
        let stored = users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::Storage(format!("unknown user {id}")))?;
        stored.assignments = assignments;
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<UserId, StoredUser>>, RepositoryError> {
        self.users
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<UserId, StoredUser>>, RepositoryError> {
        self.users
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.read()?.get(&id).map(|s| s.user.clone()))
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let expected = digest(password);
        Ok(self
            .read()?
            .values()
            .find(|s| s.user.email.eq_ignore_ascii_case(email) && s.password_digest == expected)
            .map(|s| s.user.clone()))
    }

    async fn role_assignments(&self, id: UserId) -> Result<Vec<RoleAssignment>, RepositoryError> {
        Ok(self
            .read()?
            .get(&id)
            .map(|s| s.assignments.clone())
            .unwrap_or_default())
    }
}
