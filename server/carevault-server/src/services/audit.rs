//! Centralized audit trail for the authentication system
//!
//! Every security-relevant operation writes one append-only row. Audit
//! writes must never break the operation they describe, so failures are
//! logged at warn level and swallowed.

use std::sync::Arc;

use crate::auth::db::{AuditLogStore, NewAuditLog};
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

/// Column limit on audit_logs.ip_address
const MAX_IP_LEN: usize = 45;
/// Agent strings are unbounded on the wire; cap what we persist
const MAX_USER_AGENT_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Signup,
    Verification,
    Login,
    DeviceVerification,
    TokenRefresh,
    Logout,
    PasswordResetRequest,
    PasswordReset,
    PasswordChange,
    ProfileAccess,
    ProfileUpdate,
    DeviceRemoved,
    AccountUpdate,
    AccountDeactivated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Signup => "SIGNUP",
            AuditAction::Verification => "VERIFICATION",
            AuditAction::Login => "LOGIN",
            AuditAction::DeviceVerification => "DEVICE_VERIFICATION",
            AuditAction::TokenRefresh => "TOKEN_REFRESH",
            AuditAction::Logout => "LOGOUT",
            AuditAction::PasswordResetRequest => "PASSWORD_RESET_REQUEST",
            AuditAction::PasswordReset => "PASSWORD_RESET",
            AuditAction::PasswordChange => "PASSWORD_CHANGE",
            AuditAction::ProfileAccess => "PROFILE_ACCESS",
            AuditAction::ProfileUpdate => "PROFILE_UPDATE",
            AuditAction::DeviceRemoved => "DEVICE_REMOVED",
            AuditAction::AccountUpdate => "ACCOUNT_UPDATE",
            AuditAction::AccountDeactivated => "ACCOUNT_DEACTIVATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
        }
    }
}

/// One audit event as emitted by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct AuditEvent<'a> {
    pub user_id: Option<Uuid>,
    pub resource: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub details: Option<JsonValue>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn AuditLogStore>,
}

impl AuditRecorder {
    pub fn new(repository: Arc<dyn AuditLogStore>) -> Self {
        Self { repository }
    }

    pub async fn success(&self, action: AuditAction, event: AuditEvent<'_>) {
        self.record(action, AuditStatus::Success, event).await;
    }

    pub async fn failure(&self, action: AuditAction, event: AuditEvent<'_>) {
        self.record(action, AuditStatus::Failure, event).await;
    }

    pub async fn record(&self, action: AuditAction, status: AuditStatus, event: AuditEvent<'_>) {
        let ip_address = event.ip_address.map(|ip| truncate_chars(ip, MAX_IP_LEN));
        let user_agent = event
            .user_agent
            .map(|ua| truncate_chars(ua, MAX_USER_AGENT_LEN));

        let result = self
            .repository
            .insert(NewAuditLog {
                user_id: event.user_id,
                action: action.as_str(),
                resource: event.resource,
                resource_id: event.resource_id,
                ip_address: ip_address.as_deref(),
                user_agent: user_agent.as_deref(),
                details: event.details,
                status: status.as_str(),
            })
            .await;

        if let Err(e) = result {
            warn!(
                action = action.as_str(),
                status = status.as_str(),
                error = %e,
                "Failed to write audit log entry"
            );
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
