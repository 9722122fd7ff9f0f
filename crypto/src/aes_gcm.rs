use crate::error::{CryptoError, CryptoResult};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

/// AES-256-GCM cipher for PII attributes stored at rest.
///
/// Properties:
/// - AES-256 in Galois/Counter Mode with a fresh 96-bit nonce per encryption
/// - Authentication tags for integrity
/// - Versioned wire format to allow key rotation
/// - Master key zeroized on drop
/// - Empty strings pass through unchanged in both directions, so optional
///   profile attributes never produce phantom ciphertext
#[derive(ZeroizeOnDrop)]
pub struct FieldCipher {
    #[zeroize(skip)]
    cipher: Aes256Gcm,
    /// Master key - automatically zeroized on drop
    key: [u8; 32],
    /// Key version for rotation support
    key_version: u32,
}

impl FieldCipher {
    /// Create a new cipher with a 32-byte key
    pub fn new(key: [u8; 32]) -> CryptoResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;

        Ok(Self {
            cipher,
            key,
            key_version: 1,
        })
    }

    /// Create from a base64-encoded master key
    pub fn from_base64(key_b64: &str) -> CryptoResult<Self> {
        let key_bytes = BASE64
            .decode(key_b64)
            .map_err(|_| CryptoError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: key_bytes.len(),
            });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        Self::new(key)
    }

    /// Create with specific key version
    pub fn with_version(mut self, version: u32) -> Self {
        self.key_version = version;
        self
    }

    /// Generate a new random key (cryptographically secure)
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Generate a key and encode it as base64, suitable for configuration
    pub fn generate_key_base64() -> String {
        BASE64.encode(Self::generate_key())
    }

    /// Get the current key version
    pub fn version(&self) -> u32 {
        self.key_version
    }

    /// Encrypt a field value.
    ///
    /// Output format: `v{version}:{nonce_b64}:{ciphertext_b64}`. The empty
    /// string is returned as-is.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        // 96-bit nonce (12 bytes - optimal for GCM)
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "v{}:{}:{}",
            self.key_version,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    /// Decrypt a field value previously produced by [`encrypt`](Self::encrypt).
    ///
    /// The empty string is returned as-is.
    pub fn decrypt(&self, stored: &str) -> CryptoResult<String> {
        if stored.is_empty() {
            return Ok(String::new());
        }

        let mut parts = stored.splitn(3, ':');
        let (version_part, nonce_part, ciphertext_part) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(v), Some(n), Some(c)) => (v, n, c),
                _ => return Err(CryptoError::InvalidFormat),
            };

        let version = version_part
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or(CryptoError::InvalidFormat)?;

        // With key rotation the version would select the key; a single live
        // key means anything else is undecryptable here.
        if version != self.key_version {
            return Err(CryptoError::UnsupportedKeyVersion {
                version,
                supported: self.key_version,
            });
        }

        let nonce_bytes = BASE64
            .decode(nonce_part)
            .map_err(|_| CryptoError::InvalidFormat)?;

        if nonce_bytes.len() != 12 {
            return Err(CryptoError::InvalidNonce);
        }

        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(ciphertext_part)
            .map_err(|_| CryptoError::InvalidFormat)?;

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("key_version", &self.key_version)
            .finish_non_exhaustive()
    }
}
