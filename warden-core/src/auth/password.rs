use base64::{Engine, engine::general_purpose::STANDARD};
use constant_time_eq::constant_time_eq;
use rand::{Rng, TryRngCore, distr::Alphanumeric, rngs::OsRng};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// Tag stored in the first segment of every hash this module produces.
pub const ALGORITHM_TAG: &str = "pbkdf2_sha256";

/// PBKDF2 work factor used when nothing else is configured.
pub const DEFAULT_ITERATIONS: u32 = 20_000;

/// Salt length (in alphanumeric characters) used when nothing else is
/// configured.
pub const DEFAULT_SALT_LENGTH: usize = 12;

const KEY_LENGTH: usize = 32;
const SEGMENTS: usize = 4;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("malformed password hash: {0}")]
    Malformed(&'static str),

    #[error("unsupported password hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("iteration count must be greater than zero")]
    ZeroIterations,

    #[error("salt length must be greater than zero")]
    ZeroSaltLength,
}

/// Salted PBKDF2-HMAC-SHA256 password hashing.
///
/// Hashes are serialized as `pbkdf2_sha256$<iterations>$<salt>$<base64 key>`.
/// The iteration count and salt length are fixed when the hasher is built;
/// verification honours whatever iteration count the stored hash carries so
/// raising the work factor does not lock existing users out.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: u32,
    salt_length: usize,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            salt_length: DEFAULT_SALT_LENGTH,
        }
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32, salt_length: usize) -> Result<Self, HashError> {
        if iterations == 0 {
            return Err(HashError::ZeroIterations);
        }
        if salt_length == 0 {
            return Err(HashError::ZeroSaltLength);
        }
        Ok(Self {
            iterations,
            salt_length,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let salt = self.generate_salt();
        let key = derive_key(password, salt.as_bytes(), self.iterations);
        format!(
            "{ALGORITHM_TAG}${}${salt}${}",
            self.iterations,
            STANDARD.encode(key.as_slice())
        )
    }

    /// Check `password` against a stored hash.
    ///
    /// Returns `Ok(false)` on mismatch and an error only when the stored
    /// value cannot be interpreted.
    pub fn verify(
        &self,
        password: &str,
        encoded: &str,
    ) -> Result<bool, HashError> {
        let segments: Vec<&str> = encoded.split('$').collect();
        if segments.len() != SEGMENTS {
            return Err(HashError::Malformed("hash must consist of 4 segments"));
        }
        let (tag, iterations, salt, stored_key) =
            (segments[0], segments[1], segments[2], segments[3]);

        if tag != ALGORITHM_TAG {
            return Err(HashError::UnsupportedAlgorithm(tag.to_string()));
        }

        let iterations: u32 = iterations
            .parse()
            .map_err(|_| HashError::Malformed("wrong number of iterations"))?;
        if iterations == 0 {
            return Err(HashError::Malformed("wrong number of iterations"));
        }

        let stored_key = Zeroizing::new(
            STANDARD
                .decode(stored_key)
                .map_err(|_| HashError::Malformed("wrong hash encoding"))?,
        );

        let derived = derive_key(password, salt.as_bytes(), iterations);
        Ok(constant_time_eq(derived.as_slice(), stored_key.as_slice()))
    }

    fn generate_salt(&self) -> String {
        // OS entropy; the alphanumeric alphabet keeps `$` out of the salt
        let mut rng = OsRng.unwrap_err();
        (0..self.salt_length)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Zeroizing<[u8; KEY_LENGTH]> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt,
        iterations,
        key.as_mut_slice(),
    );
    key
}
