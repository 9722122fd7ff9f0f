//! Trusted device repository

use super::{DbResult, DeviceStore};
use crate::auth::models::TrustedDevice;
use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

const DEVICE_COLUMNS: &str = "id, user_id, fingerprint_hash, created_at, last_used_at";

#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceStore for DeviceRepository {
    /// Register a fingerprint as trusted. Racing registrations of the same
    /// fingerprint collapse onto the unique index and refresh last_used_at
    /// instead of failing.
    async fn register(&self, user_id: Uuid, fingerprint_hash: &str) -> DbResult<TrustedDevice> {
        let sql = format!(
            "INSERT INTO trusted_devices (user_id, fingerprint_hash) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id, fingerprint_hash) \
             DO UPDATE SET last_used_at = NOW() \
             RETURNING {DEVICE_COLUMNS}"
        );
        sqlx::query_as::<_, TrustedDevice>(&sql)
            .bind(user_id)
            .bind(fingerprint_hash)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint_hash: &str,
    ) -> DbResult<Option<TrustedDevice>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM trusted_devices \
             WHERE user_id = $1 AND fingerprint_hash = $2"
        );
        sqlx::query_as::<_, TrustedDevice>(&sql)
            .bind(user_id)
            .bind(fingerprint_hash)
            .fetch_optional(&self.pool)
            .await
    }

    async fn count_for_user(&self, user_id: Uuid) -> DbResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trusted_devices WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn touch(&self, device_id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE trusted_devices SET last_used_at = NOW() WHERE id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<TrustedDevice>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM trusted_devices \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, TrustedDevice>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Delete one of the caller's devices; false when the id is unknown or
    /// owned by someone else
    async fn remove(&self, user_id: Uuid, device_id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM trusted_devices WHERE id = $1 AND user_id = $2")
            .bind(device_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
