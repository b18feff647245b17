//! Warden core library
//!
//! Credential handling and request resilience for a user-management
//! service:
//!
//! - [`auth`]: salted PBKDF2 password hashes, HS256 access/refresh tokens,
//!   the login and token exchange flows, and the bearer access check
//! - [`rbac`]: roles and the route to role binding port
//! - [`users`]: account records, validation and the user service
//! - [`resilience`]: token-bucket rate limiting and the circuit breaker
//! - [`pipeline`]: the ordered stage chain every request runs through
//! - [`repositories`]: in-memory implementations of the storage ports

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod rbac;
pub mod repositories;
pub mod resilience;
pub mod users;
pub mod validation;

pub use error::{AuthError, ErrorKind, Result, ServiceError};
pub use rbac::Role;
