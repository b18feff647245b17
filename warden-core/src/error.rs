//! Error taxonomy shared by every layer of the service.
//!
//! Component errors ([`HashError`], [`TokenError`], [`AuthError`],
//! [`ValidationErrors`]) convert into [`ServiceError`] without losing their
//! discriminant, so the circuit breaker and the presentation boundary can
//! both decide on [`ServiceError::kind`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::auth::password::HashError;
use crate::auth::token::TokenError;
use crate::validation::ValidationErrors;

/// Coarse classification of a failure, independent of its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or semantically invalid request input
    InvalidArgument,
    /// The requested record does not exist
    NotFound,
    /// A unique key is already taken
    AlreadyExists,
    /// Missing, malformed, expired or otherwise unverifiable credentials
    Unauthenticated,
    /// Authenticated, but the role is not bound to the route
    PermissionDenied,
    /// Admission control rejected the request
    ResourceExhausted,
    /// The service (or a dependency) is temporarily unavailable
    Unavailable,
    /// Unexpected internal fault
    Internal,
}

impl ErrorKind {
    /// Whether the failure was caused by the caller rather than by the
    /// service or its infrastructure.
    pub fn is_client_fault(self) -> bool {
        match self {
            ErrorKind::InvalidArgument
            | ErrorKind::NotFound
            | ErrorKind::AlreadyExists
            | ErrorKind::Unauthenticated
            | ErrorKind::PermissionDenied
            | ErrorKind::ResourceExhausted => true,
            ErrorKind::Unavailable | ErrorKind::Internal => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is not provided")]
    MissingAuthHeader,

    #[error("invalid authorization header format")]
    MalformedAuthHeader,

    #[error("user not found")]
    UserNotFound,

    #[error("wrong credentials")]
    WrongCredentials,

    #[error("invalid token: {0}")]
    Token(#[from] TokenError),

    #[error("permission denied")]
    PermissionDenied,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::PermissionDenied => ErrorKind::PermissionDenied,
            // Signing failures surface through `ServiceError::from`, never here
            AuthError::Token(TokenError::Signing(_)) => ErrorKind::Internal,
            AuthError::MissingAuthHeader
            | AuthError::MalformedAuthHeader
            | AuthError::WrongCredentials
            | AuthError::Token(_) => ErrorKind::Unauthenticated,
        }
    }
}

/// The error returned by every service operation and pipeline stage.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("too many requests")]
    RateLimited,

    #[error("service unavailable")]
    CircuitOpen,

    #[error("{0}")]
    Unavailable(String),

    #[error("{context}")]
    Internal {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::InvalidArgument,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ServiceError::Auth(err) => err.kind(),
            ServiceError::RateLimited => ErrorKind::ResourceExhausted,
            ServiceError::CircuitOpen | ServiceError::Unavailable(_) => {
                ErrorKind::Unavailable
            }
            ServiceError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Wrap an infrastructure failure with a short, caller-safe context.
    pub fn internal(
        context: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(err: HashError) -> Self {
        ServiceError::internal("stored password hash is unusable", err)
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => {
                ServiceError::internal("failed to sign token", err)
            }
            other => ServiceError::Auth(AuthError::Token(other)),
        }
    }
}
