//! JWT access token service
//!
//! Short-lived HS256 tokens carried in an HttpOnly cookie. Refresh tokens are
//! opaque and live in the ephemeral store, not here.

use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (account ID)
    pub sub: String,

    /// Account email
    pub email: String,

    /// Account role
    pub role: String,

    /// Issued at timestamp (seconds since epoch)
    pub iat: i64,

    /// Expiration timestamp (seconds since epoch)
    pub exp: i64,
}

impl AccessClaims {
    /// Create new claims for an account
    pub fn new(user_id: Uuid, email: &str, role: &str, ttl_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }

    /// Check if token is expired
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    /// Get account ID as UUID
    pub fn user_id(&self) -> ApiResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| ApiError::authentication("Invalid subject in token"))
    }
}

/// Signs and validates access tokens with a shared HMAC secret
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(secret: &str, access_token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: access_token_ttl.as_secs() as i64,
        }
    }

    /// Access token lifetime in seconds
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue an access token for an account
    pub fn issue(&self, user_id: Uuid, email: &str, role: &str) -> ApiResult<String> {
        let claims = AccessClaims::new(user_id, email, role, self.ttl_seconds);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::internal(format!("Failed to encode access token: {e}")))
    }

    /// Validate an access token and return its claims
    pub fn validate(&self, token: &str) -> ApiResult<AccessClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::authentication("Invalid or expired token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn service() -> JwtService {
        JwtService::new("test-secret", Duration::from_secs(900))
    }

    #[test]
    fn test_issue_validate_roundtrip() {
        let svc = service();
        let user_id = Uuid::new_v4();

        let token = svc.issue(user_id, "pat@example.com", "patient").unwrap();
        let claims = svc.validate(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "pat@example.com");
        assert_eq!(claims.role, "patient");
        assert!(!claims.is_expired());
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = JwtService {
            encoding_key: EncodingKey::from_secret(b"test-secret"),
            decoding_key: DecodingKey::from_secret(b"test-secret"),
            ttl_seconds: -300,
        };

        let token = svc.issue(Uuid::new_v4(), "pat@example.com", "patient").unwrap();
        assert!(svc.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service()
            .issue(Uuid::new_v4(), "pat@example.com", "patient")
            .unwrap();

        let other = JwtService::new("different-secret", Duration::from_secs(900));
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(service().validate("not.a.jwt").is_err());
        assert!(service().validate("").is_err());
    }

    #[test]
    fn test_bad_subject_rejected() {
        let claims = AccessClaims {
            sub: "not-a-uuid".to_string(),
            email: "pat@example.com".to_string(),
            role: "patient".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 900,
        };
        assert!(claims.user_id().is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_preserves_identity(
            email in "[a-z]{1,12}@[a-z]{1,8}\\.(com|org)",
            role in "(patient|doctor|staff|admin|superadmin)",
        ) {
            let svc = service();
            let user_id = Uuid::new_v4();
            let token = svc.issue(user_id, &email, &role).unwrap();
            let claims = svc.validate(&token).unwrap();
            prop_assert_eq!(claims.user_id().unwrap(), user_id);
            prop_assert_eq!(claims.email, email);
            prop_assert_eq!(claims.role, role);
        }
    }
}
