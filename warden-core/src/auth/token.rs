//! Signed access and refresh tokens.
//!
//! Both token kinds are HS256 JWTs carrying the same [`TokenClaims`]; they
//! differ only in the key they are signed with and in their lifetime.
//! Verification accepts the HMAC family only, which rules out algorithm
//! confusion (`none`, or an asymmetric algorithm whose public key is
//! treated as an HMAC secret).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::rbac::Role;

const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("unexpected signing method")]
    UnexpectedAlgorithm,

    #[error("token signature or encoding is invalid")]
    Invalid,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token secret key must not be empty")]
    EmptyKey,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::ExpiredSignature => TokenError::Expired,
            JwtErrorKind::InvalidAlgorithm
            | JwtErrorKind::InvalidAlgorithmName => {
                TokenError::UnexpectedAlgorithm
            }
            _ => TokenError::Invalid,
        }
    }
}

/// Payload embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Username (email) of the principal
    #[serde(rename = "username")]
    pub subject: String,
    pub role: Role,
    /// Expiration as a unix timestamp in seconds
    pub exp: i64,
}

impl TokenClaims {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// HMAC secret held in zeroized memory.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(TokenError::EmptyKey);
        }
        Ok(Self(Zeroizing::new(key.to_vec())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Sign a token for `subject` that expires `ttl` from now.
pub fn generate_token(
    subject: &str,
    role: Role,
    key: &SecretKey,
    ttl: Duration,
) -> Result<String, TokenError> {
    let claims = TokenClaims {
        subject: subject.to_string(),
        role,
        exp: Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .map_err(TokenError::Signing)
}

/// Verify signature, algorithm family and expiry of `token`.
pub fn verify_token(
    token: &str,
    key: &SecretKey,
) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.leeway = 0;
    validation.validate_exp = true;

    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// A signing key paired with the lifetime of the tokens it issues.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SecretKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(key: SecretKey, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Build from a `std` duration, saturating absurdly large values.
    pub fn from_std(key: SecretKey, ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        Self::new(key, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        subject: &str,
        role: Role,
    ) -> Result<String, TokenError> {
        generate_token(subject, role, &self.key, self.ttl)
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        verify_token(token, &self.key)
    }
}
