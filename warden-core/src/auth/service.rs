use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::password::PasswordHasher;
use super::token::TokenIssuer;
use crate::error::{AuthError, Result, ServiceError};
use crate::users::{User, UserRepository};
use crate::validation::{Validate, ValidationErrors};

/// Username/password exchange for a refresh token.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.ensure(
            !self.username.trim().is_empty(),
            "username",
            "username is required",
        );
        errors.ensure(
            !self.password.is_empty(),
            "password",
            "password is required",
        );
        errors.into_result()
    }
}

/// Body of both token exchange endpoints.
#[derive(Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl fmt::Debug for RefreshTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshTokenRequest { .. }")
    }
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.ensure(
            !self.refresh_token.is_empty(),
            "refresh_token",
            "refresh token is required",
        );
        errors.into_result()
    }
}

/// Credential flows: login, access token minting and refresh rotation.
///
/// Refresh tokens are stateless. Rotating one through
/// [`AuthService::get_refresh_token`] does not revoke the old token; it
/// stays usable until it expires.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    access: TokenIssuer,
    refresh: TokenIssuer,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("access_ttl", &self.access.ttl())
            .field("refresh_ttl", &self.refresh.ttl())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: PasswordHasher,
        access: TokenIssuer,
        refresh: TokenIssuer,
    ) -> Self {
        Self {
            users,
            hasher,
            access,
            refresh,
        }
    }

    /// Authenticate with username (email) and password; returns a refresh
    /// token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let user = self.resolve(username).await?;

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(user_id = user.id, "login rejected: wrong credentials");
            return Err(AuthError::WrongCredentials.into());
        }

        let token = self.refresh.issue(&user.email, user.role)?;
        info!(user_id = user.id, "login succeeded");
        Ok(token)
    }

    /// Mint an access token from a valid refresh token.
    pub async fn get_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<String> {
        let user = self.user_for_refresh_token(refresh_token).await?;
        let token = self.access.issue(&user.email, user.role)?;
        debug!(user_id = user.id, "access token issued");
        Ok(token)
    }

    /// Exchange a valid refresh token for a fresh one.
    pub async fn get_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<String> {
        let user = self.user_for_refresh_token(refresh_token).await?;
        let token = self.refresh.issue(&user.email, user.role)?;
        debug!(user_id = user.id, "refresh token rotated");
        Ok(token)
    }

    async fn user_for_refresh_token(&self, token: &str) -> Result<User> {
        let claims = self.refresh.verify(token).map_err(|err| {
            debug!(error = %err, "refresh token rejected");
            ServiceError::from(err)
        })?;
        // Role and existence are taken from storage, not from the old claims
        self.resolve(&claims.subject).await
    }

    async fn resolve(&self, email: &str) -> Result<User> {
        self.users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }
}
