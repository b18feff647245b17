//! User records, write commands and the storage port.

mod service;

pub use service::UserService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::rbac::Role;
use crate::validation::{Validate, ValidationErrors, is_valid_email};

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account data handed to [`UserRepository::create`]; the repository
/// assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request.
#[derive(Clone, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub role: Role,
}

impl fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

impl Validate for CreateUser {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.ensure(is_valid_email(&self.email), "email", "invalid email");
        errors.ensure(
            !self.password.is_empty(),
            "password",
            "password must not be empty",
        );
        errors.ensure(
            self.password == self.password_confirm,
            "password_confirm",
            "password mismatch",
        );
        errors.into_result()
    }
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    #[serde(default)]
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Validate for UpdateUser {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(email) = &self.email {
            errors.ensure(is_valid_email(email), "email", "invalid email");
        }
        if let Some(name) = &self.name {
            errors.ensure(
                !name.trim().is_empty(),
                "name",
                "name must not be empty",
            );
        }
        errors.into_result()
    }
}

/// Account storage.
///
/// Implementations enforce email uniqueness: `create` and `update` fail
/// with [`ServiceError::AlreadyExists`](crate::error::ServiceError) when
/// another account already owns the address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User>;
    async fn get(&self, id: i64) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Returns `false` when no account with `user.id` exists.
    async fn update(&self, user: &User) -> Result<bool>;
    /// Returns `false` when no account with `id` exists.
    async fn delete(&self, id: i64) -> Result<bool>;
}
