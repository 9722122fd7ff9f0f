//! Database repository layer for authentication
//!
//! Typed query interfaces for the tables the auth system owns. All SQL lives
//! here; the service layer never touches the pool directly. Each table sits
//! behind a store trait so the auth flows can run against in-memory fakes in
//! tests; the Postgres repositories are the production implementations.

pub mod audit_repository;
pub mod device_repository;
pub mod password_history_repository;
pub mod profile_repository;
pub mod user_repository;

pub use audit_repository::{AuditLogRepository, NewAuditLog};
pub use device_repository::DeviceRepository;
pub use password_history_repository::PasswordHistoryRepository;
pub use profile_repository::ProfileRepository;
pub use user_repository::UserRepository;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

use crate::auth::models::{
    PasswordHistoryEntry, ProfilePayload, TrustedDevice, User, UserProfile, UserRole,
};

/// Common database operations result type
pub type DbResult<T> = Result<T, sqlx::Error>;

/// Account rows
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
        salt: &str,
        role: UserRole,
        is_verified: bool,
    ) -> DbResult<User>;

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> DbResult<Option<User>>;

    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<User>;

    async fn update_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        salt: &str,
    ) -> DbResult<()>;

    async fn deactivate(&self, user_id: Uuid) -> DbResult<()>;
}

/// Trusted-device rows
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn register(&self, user_id: Uuid, fingerprint_hash: &str) -> DbResult<TrustedDevice>;

    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint_hash: &str,
    ) -> DbResult<Option<TrustedDevice>>;

    async fn count_for_user(&self, user_id: Uuid) -> DbResult<i64>;

    async fn touch(&self, device_id: Uuid) -> DbResult<()>;

    async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<TrustedDevice>>;

    async fn remove(&self, user_id: Uuid, device_id: Uuid) -> DbResult<bool>;
}

/// Append-only password history
#[async_trait]
pub trait PasswordHistoryStore: Send + Sync {
    async fn append(&self, user_id: Uuid, hashed_password: &str, salt: &str) -> DbResult<()>;

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<PasswordHistoryEntry>>;
}

/// Encrypted profile rows
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> DbResult<Option<UserProfile>>;

    async fn upsert(&self, user_id: Uuid, payload: &ProfilePayload) -> DbResult<UserProfile>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn insert(&self, entry: NewAuditLog<'_>) -> DbResult<()>;
}

/// Combined repository providing access to all auth tables
#[derive(Clone)]
pub struct AuthRepository {
    pub users: Arc<dyn UserStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub password_history: Arc<dyn PasswordHistoryStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub audit_logs: Arc<dyn AuditLogStore>,
}

impl AuthRepository {
    /// Production wiring: every store backed by the same Postgres pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            devices: Arc::new(DeviceRepository::new(pool.clone())),
            password_history: Arc::new(PasswordHistoryRepository::new(pool.clone())),
            profiles: Arc::new(ProfileRepository::new(pool.clone())),
            audit_logs: Arc::new(AuditLogRepository::new(pool)),
        }
    }
}
