//! Credential and token primitives
//!
//! - Argon2id password hashing over password + per-account salt
//! - Verification codes, refresh tokens, challenge ids
//! - Device fingerprint derivation

use crate::error::{ApiError, ApiResult};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Per-account salt length
const SALT_LENGTH: usize = 16;

/// Digits in an emailed verification code
const VERIFICATION_CODE_LENGTH: usize = 6;

/// Random bytes in an opaque refresh token
const REFRESH_TOKEN_BYTES: usize = 32;

/// Random bytes in a device challenge id
const CHALLENGE_ID_BYTES: usize = 16;

/// Argon2id password hasher.
///
/// The per-account salt is appended to the password before hashing; Argon2
/// additionally salts internally, so the stored hash is self-contained.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a hasher with secure Argon2id configuration
    pub fn new() -> anyhow::Result<Self> {
        // Memory: 19MB (19456 KiB)
        // Iterations: 2
        // Parallelism: 1 thread
        // Output length: 32 bytes
        let params = Params::new(
            19456,    // m_cost (memory in KiB)
            2,        // t_cost (iterations)
            1,        // p_cost (parallelism)
            Some(32), // output length
        )
        .map_err(|e| anyhow::anyhow!("Failed to build Argon2 params: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password with its account salt.
    ///
    /// This is CPU-intensive and runs on the blocking pool.
    pub async fn hash(&self, password: &str, salt: &str) -> ApiResult<String> {
        let salted = format!("{password}{salt}");
        let argon2 = self.argon2.clone();

        tokio::task::spawn_blocking(move || {
            let hash_salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(salted.as_bytes(), &hash_salt)
                .map(|hash| hash.to_string())
                .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))
        })
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task panicked: {e}")))?
    }

    /// Verify a password + salt pair against a stored hash.
    ///
    /// Returns `Ok(false)` on mismatch; errors only on malformed input.
    pub async fn verify(&self, password: &str, salt: &str, hash: &str) -> ApiResult<bool> {
        let salted = format!("{password}{salt}");
        let hash = hash.to_string();
        let argon2 = self.argon2.clone();

        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&hash)
                .map_err(|e| ApiError::internal(format!("Failed to parse password hash: {e}")))?;

            match argon2.verify_password(salted.as_bytes(), &parsed_hash) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(ApiError::internal(format!(
                    "Password verification error: {e}"
                ))),
            }
        })
        .await
        .map_err(|e| ApiError::internal(format!("Password verification task panicked: {e}")))?
    }
}

/// Generate a random alphanumeric account salt
pub fn generate_salt() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a numeric verification code, leading zeros allowed
pub fn generate_verification_code() -> String {
    (0..VERIFICATION_CODE_LENGTH)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}

/// Generate an opaque refresh token (URL-safe base64)
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a device challenge id (URL-safe base64)
pub fn generate_challenge_id() -> String {
    let mut bytes = [0u8; CHALLENGE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time comparison for emailed codes
pub fn codes_match(submitted: &str, stored: &str) -> bool {
    submitted.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Derive a device fingerprint from connection attributes.
///
/// Trusts the attributes it is given; a client-supplied fingerprint bypasses
/// this derivation entirely.
pub fn device_fingerprint(client_ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{client_ip}:{user_agent}").as_bytes());
    hex::encode(hasher.finalize())
}
