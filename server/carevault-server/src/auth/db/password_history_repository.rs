//! Password history repository
//!
//! Append-only; rows are never updated or deleted so the reuse check always
//! sees the full recent window.

use super::{DbResult, PasswordHistoryStore};
use crate::auth::models::PasswordHistoryEntry;
use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PasswordHistoryRepository {
    pool: PgPool,
}

impl PasswordHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordHistoryStore for PasswordHistoryRepository {
    async fn append(&self, user_id: Uuid, hashed_password: &str, salt: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO password_history (user_id, hashed_password, salt) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(hashed_password)
        .bind(salt)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent entries first, newest `limit` rows
    async fn recent_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<PasswordHistoryEntry>> {
        sqlx::query_as::<_, PasswordHistoryEntry>(
            "SELECT id, user_id, hashed_password, salt, created_at \
             FROM password_history \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
