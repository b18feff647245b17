use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::{CreateUser, NewUser, UpdateUser, User, UserRepository};
use crate::auth::password::PasswordHasher;
use crate::error::{Result, ServiceError};
use crate::validation::Validate;

/// Account management on top of a [`UserRepository`].
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// Register a new account and return its id.
    pub async fn create(&self, request: CreateUser) -> Result<i64> {
        request.validate()?;

        let now = Utc::now();
        let user = self
            .users
            .create(NewUser {
                name: request.name,
                email: request.email.trim().to_string(),
                password_hash: self.hasher.hash(&request.password),
                role: request.role,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(user_id = user.id, role = %user.role, "user created");
        Ok(user.id)
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        self.users
            .get(id)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    pub async fn update(&self, request: UpdateUser) -> Result<()> {
        request.validate()?;

        let mut user = self.get(request.id).await?;
        if let Some(name) = request.name {
            user.name = name;
        }
        if let Some(email) = request.email {
            user.email = email.trim().to_string();
        }
        user.updated_at = Utc::now();

        if !self.users.update(&user).await? {
            return Err(user_not_found(user.id));
        }
        info!(user_id = user.id, "user updated");
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.users.delete(id).await? {
            return Err(user_not_found(id));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }
}

fn user_not_found(id: i64) -> ServiceError {
    ServiceError::not_found(format!("user {id} not found"))
}
