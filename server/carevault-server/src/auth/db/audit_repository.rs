//! Audit log repository

use super::{AuditLogStore, DbResult};
use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

/// One audit row as written; id and created_at come from the database
#[derive(Debug, Clone)]
pub struct NewAuditLog<'a> {
    pub user_id: Option<Uuid>,
    pub action: &'a str,
    pub resource: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub details: Option<serde_json::Value>,
    pub status: &'a str,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for AuditLogRepository {
    async fn insert(&self, entry: NewAuditLog<'_>) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs \
                 (user_id, action, resource, resource_id, ip_address, user_agent, details, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.resource)
        .bind(entry.resource_id)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(entry.details)
        .bind(entry.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
