//! Field-level cryptography for CareVault Engine
//!
//! This crate provides the primitives used to protect PII at rest:
//! - AES-256-GCM encryption with a versioned wire format for key rotation
//! - Per-field encryption helpers for JSON profile documents
//! - Secure key generation with automatic zeroization of key material
//!
//! # Example
//!
//! ```rust
//! use crypto::FieldCipher;
//!
//! # fn main() -> Result<(), crypto::CryptoError> {
//! let cipher = FieldCipher::new(FieldCipher::generate_key())?;
//! let stored = cipher.encrypt("MRN-00481516")?;
//! assert_eq!(cipher.decrypt(&stored)?, "MRN-00481516");
//! # Ok(())
//! # }
//! ```

pub mod aes_gcm;
pub mod error;
pub mod fields;

pub use aes_gcm::FieldCipher;
pub use error::{CryptoError, CryptoResult};
pub use fields::SENSITIVE_PROFILE_FIELDS;
