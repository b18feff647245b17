//! Credentials: password hashing, signed tokens, login flows and the
//! endpoint access check.

pub mod access;
pub mod password;
pub mod service;
pub mod token;

pub use access::{AccessChecker, extract_bearer};
pub use password::{HashError, PasswordHasher};
pub use service::{AuthService, LoginRequest, RefreshTokenRequest};
pub use token::{
    SecretKey, TokenClaims, TokenError, TokenIssuer, generate_token,
    verify_token,
};
