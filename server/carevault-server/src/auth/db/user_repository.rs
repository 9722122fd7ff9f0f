//! User repository for database operations

use super::{DbResult, UserStore};
use crate::auth::models::{User, UserRole};
use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

const USER_COLUMNS: &str = "id, email, name, hashed_password, salt, role, \
     is_verified, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    /// Insert a new user; the unique index on email surfaces concurrent
    /// duplicates as a database error rather than a racy pre-check
    async fn create(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
        salt: &str,
        role: UserRole,
        is_verified: bool,
    ) -> DbResult<User> {
        let sql = format!(
            "INSERT INTO users (email, name, hashed_password, salt, role, is_verified) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(name)
            .bind(hashed_password)
            .bind(salt)
            .bind(role)
            .bind(is_verified)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update name and/or email; changing the email drops the verified flag
    /// since the new address has never been confirmed
    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<User> {
        let sql = format!(
            "UPDATE users SET \
                 email = COALESCE($2, email), \
                 name = COALESCE($3, name), \
                 is_verified = CASE \
                     WHEN $2 IS NOT NULL AND $2 <> email THEN false \
                     ELSE is_verified \
                 END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(email)
            .bind(name)
            .fetch_one(&self.pool)
            .await
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        salt: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE users SET hashed_password = $2, salt = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(hashed_password)
        .bind(salt)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft-deactivate; the row stays for audit trails and email uniqueness
    async fn deactivate(&self, user_id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
