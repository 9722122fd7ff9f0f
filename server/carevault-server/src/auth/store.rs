//! Short-lived authentication state in Redis
//!
//! Pending registrations, device challenges, and password reset challenges
//! live only here and expire via TTL. Refresh tokens are stored under a
//! per-account key plus a reverse index so a bare token can be resolved
//! back to its owner. The raw get/set/delete operations sit behind the
//! [`KvBackend`] trait so the auth flows can run over an in-memory map in
//! tests; production uses [`RedisBackend`].

use std::sync::Arc;

use crate::auth::models::UserRole;
use crate::error::{ApiError, ApiResult};
use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

/// Open a Redis connection manager; shared by the store and the rate limiter
pub async fn connect(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
    ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")
}

/// Raw expiring key-value operations the ephemeral store is built on
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn set_ex(&self, key: String, value: String, ttl_seconds: u64) -> ApiResult<()>;

    async fn get(&self, key: String) -> ApiResult<Option<String>>;

    async fn del(&self, key: String) -> ApiResult<()>;

    async fn ping(&self) -> ApiResult<()>;
}

/// Production backend over a shared Redis connection manager
#[derive(Clone)]
pub struct RedisBackend {
    redis: ConnectionManager,
}

impl RedisBackend {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn set_ex(&self, key: String, value: String, ttl_seconds: u64) -> ApiResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn get(&self, key: String) -> ApiResult<Option<String>> {
        let mut conn = self.redis.clone();
        Ok(conn.get(key).await?)
    }

    async fn del(&self, key: String) -> ApiResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> ApiResult<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

// =============================================================================
// STORED RECORDS
// =============================================================================

/// Staged signup awaiting email verification; no users row exists yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub salt: String,
    pub role: UserRole,
    pub verification_code: String,
    pub created_at: i64,
}

/// Login from an unrecognized device, parked until the emailed code comes back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceChallenge {
    pub email: String,
    pub code: String,
    pub device_fingerprint: String,
    pub challenge_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetChallenge {
    pub email: String,
    pub code: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: i64,
}

// =============================================================================
// KEY SCHEME
// =============================================================================

fn registration_key(email: &str) -> String {
    format!("registration:{email}")
}

fn device_key(email: &str) -> String {
    format!("device_verify:{email}")
}

fn reset_key(email: &str) -> String {
    format!("reset:{email}")
}

fn refresh_key(user_id: Uuid, token: &str) -> String {
    format!("refresh_token:{user_id}:{token}")
}

fn refresh_index_key(token: &str) -> String {
    format!("refresh_index:{token}")
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct EphemeralStore {
    backend: Arc<dyn KvBackend>,
}

impl EphemeralStore {
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    async fn put_json<T: Serialize>(&self, key: String, record: &T, ttl_seconds: u64) -> ApiResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| ApiError::internal(format!("Failed to serialize record: {e}")))?;
        self.backend.set_ex(key, json, ttl_seconds).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, key: String) -> ApiResult<Option<T>> {
        match self.backend.get(key).await? {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| ApiError::internal(format!("Failed to deserialize record: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: String) -> ApiResult<()> {
        self.backend.del(key).await
    }

    // ----- pending registrations -----

    pub async fn put_pending_registration(
        &self,
        record: &PendingRegistration,
        ttl_seconds: u64,
    ) -> ApiResult<()> {
        self.put_json(registration_key(&record.email), record, ttl_seconds)
            .await
    }

    pub async fn get_pending_registration(
        &self,
        email: &str,
    ) -> ApiResult<Option<PendingRegistration>> {
        self.get_json(registration_key(email)).await
    }

    pub async fn delete_pending_registration(&self, email: &str) -> ApiResult<()> {
        self.delete(registration_key(email)).await
    }

    // ----- device challenges -----

    pub async fn put_device_challenge(
        &self,
        record: &DeviceChallenge,
        ttl_seconds: u64,
    ) -> ApiResult<()> {
        self.put_json(device_key(&record.email), record, ttl_seconds)
            .await
    }

    pub async fn get_device_challenge(&self, email: &str) -> ApiResult<Option<DeviceChallenge>> {
        self.get_json(device_key(email)).await
    }

    pub async fn delete_device_challenge(&self, email: &str) -> ApiResult<()> {
        self.delete(device_key(email)).await
    }

    // ----- password reset challenges -----

    pub async fn put_reset_challenge(
        &self,
        record: &PasswordResetChallenge,
        ttl_seconds: u64,
    ) -> ApiResult<()> {
        self.put_json(reset_key(&record.email), record, ttl_seconds)
            .await
    }

    pub async fn get_reset_challenge(
        &self,
        email: &str,
    ) -> ApiResult<Option<PasswordResetChallenge>> {
        self.get_json(reset_key(email)).await
    }

    pub async fn delete_reset_challenge(&self, email: &str) -> ApiResult<()> {
        self.delete(reset_key(email)).await
    }

    // ----- refresh tokens -----

    /// Store a refresh token under its owner plus the reverse index, both
    /// expiring together
    pub async fn store_refresh_token(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
        ttl_seconds: u64,
        now: i64,
    ) -> ApiResult<()> {
        let record = RefreshTokenRecord {
            user_id,
            email: email.to_string(),
            created_at: now,
        };
        self.put_json(refresh_key(user_id, token), &record, ttl_seconds)
            .await?;

        self.backend
            .set_ex(refresh_index_key(token), user_id.to_string(), ttl_seconds)
            .await
    }

    /// Resolve a refresh token to its owner, requiring both the index entry
    /// and the primary record to still exist
    pub async fn refresh_token_owner(&self, token: &str) -> ApiResult<Option<Uuid>> {
        let Some(owner) = self.backend.get(refresh_index_key(token)).await? else {
            return Ok(None);
        };
        let Ok(user_id) = Uuid::parse_str(&owner) else {
            return Ok(None);
        };

        let record: Option<RefreshTokenRecord> = self.get_json(refresh_key(user_id, token)).await?;
        Ok(record.map(|r| r.user_id))
    }

    /// Delete a refresh token and its index entry; a no-op when the token is
    /// already gone
    pub async fn revoke_refresh_token(&self, token: &str) -> ApiResult<()> {
        if let Some(owner) = self.backend.get(refresh_index_key(token)).await? {
            if let Ok(user_id) = Uuid::parse_str(&owner) {
                self.backend.del(refresh_key(user_id, token)).await?;
            }
        }
        self.backend.del(refresh_index_key(token)).await
    }

    pub async fn ping(&self) -> ApiResult<()> {
        self.backend.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        let user_id = Uuid::nil();
        assert_eq!(
            registration_key("pat@example.com"),
            "registration:pat@example.com"
        );
        assert_eq!(device_key("pat@example.com"), "device_verify:pat@example.com");
        assert_eq!(reset_key("pat@example.com"), "reset:pat@example.com");
        assert_eq!(
            refresh_key(user_id, "tok123"),
            format!("refresh_token:{user_id}:tok123")
        );
        assert_eq!(refresh_index_key("tok123"), "refresh_index:tok123");
    }

    #[test]
    fn test_pending_registration_wire_format() {
        let record = PendingRegistration {
            email: "pat@example.com".to_string(),
            name: "Pat".to_string(),
            hashed_password: "$argon2id$...".to_string(),
            salt: "abcdefgh12345678".to_string(),
            role: UserRole::Doctor,
            verification_code: "042913".to_string(),
            created_at: 1_700_000_000,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["role"], "doctor");
        assert_eq!(json["verification_code"], "042913");
        assert_eq!(json["created_at"], 1_700_000_000);

        let back: PendingRegistration = serde_json::from_value(json).unwrap();
        assert_eq!(back.verification_code, record.verification_code);
    }

    #[test]
    fn test_device_challenge_keeps_fingerprint() {
        let record = DeviceChallenge {
            email: "pat@example.com".to_string(),
            code: "123456".to_string(),
            device_fingerprint: "f".repeat(64),
            challenge_id: "challenge-abc".to_string(),
            created_at: 1_700_000_000,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: DeviceChallenge = serde_json::from_str(&json).unwrap();
        assert_eq!(back.device_fingerprint, record.device_fingerprint);
        assert_eq!(back.challenge_id, "challenge-abc");
    }
}
