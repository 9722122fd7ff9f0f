//! Account self-service for authenticated users
//!
//! Profile reads and writes, password changes, trusted-device management,
//! soft deactivation. Sensitive profile fields are encrypted before they
//! reach Postgres and decrypted on the way back out.

use std::sync::Arc;

use crypto::FieldCipher;
use email_service::{Notifier, NotifyMessage};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::auth::db::AuthRepository;
use crate::auth::models::{
    ChangePasswordRequest, ProfilePayload, ProfileResponse, TrustedDevice, UpdateUserRequest, User,
    UserProfile,
};
use crate::auth::security::{generate_salt, PasswordHasher};
use crate::auth::store::EphemeralStore;
use crate::error::{ApiError, ApiResult};
use crate::middleware::ClientMeta;
use crate::services::{AuditAction, AuditEvent, AuditRecorder};

#[derive(Clone)]
pub struct AccountService {
    repos: AuthRepository,
    store: EphemeralStore,
    hasher: PasswordHasher,
    cipher: Arc<FieldCipher>,
    notifier: Arc<dyn Notifier>,
    audit: AuditRecorder,
    password_history_depth: i64,
}

impl AccountService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: AuthRepository,
        store: EphemeralStore,
        hasher: PasswordHasher,
        cipher: Arc<FieldCipher>,
        notifier: Arc<dyn Notifier>,
        audit: AuditRecorder,
        password_history_depth: usize,
    ) -> Self {
        Self {
            repos,
            store,
            hasher,
            cipher,
            notifier,
            audit,
            password_history_depth: password_history_depth as i64,
        }
    }

    /// Update name and/or email. An email change lowercases the address,
    /// rejects collisions, and drops the verified flag since the new address
    /// has never been confirmed.
    pub async fn update_account(
        &self,
        user: &User,
        request: UpdateUserRequest,
        meta: &ClientMeta,
    ) -> ApiResult<User> {
        let email = request.email.map(|e| e.to_lowercase());

        if let Some(candidate) = email.as_deref() {
            if candidate != user.email
                && self.repos.users.find_by_email(candidate).await?.is_some()
            {
                return Err(ApiError::conflict("Email already registered"));
            }
        }

        // The pre-check races with concurrent updates; the unique index has
        // the final word.
        let updated = match self
            .repos
            .users
            .update_account(user.id, email.as_deref(), request.name.as_deref())
            .await
        {
            Ok(updated) => updated,
            Err(e) if is_unique_violation(&e) => {
                return Err(ApiError::conflict("Email already registered"));
            }
            Err(e) => return Err(e.into()),
        };

        let mut fields = Vec::new();
        if email.is_some() {
            fields.push("email");
        }
        if request.name.is_some() {
            fields.push("name");
        }

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        event.details = Some(json!({ "fields": fields }));
        self.audit.success(AuditAction::AccountUpdate, event).await;

        Ok(updated)
    }

    /// Soft-deactivate the account and revoke the presented refresh token.
    /// The row stays behind for audit trails and email uniqueness.
    pub async fn deactivate(
        &self,
        user: &User,
        refresh_token: Option<&str>,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        self.repos.users.deactivate(user.id).await?;

        if let Some(token) = refresh_token {
            if let Err(e) = self.store.revoke_refresh_token(token).await {
                warn!(error = %e, "Failed to revoke refresh token during deactivation");
            }
        }

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit
            .success(AuditAction::AccountDeactivated, event)
            .await;

        Ok(())
    }

    pub async fn list_devices(&self, user: &User) -> ApiResult<Vec<TrustedDevice>> {
        Ok(self.repos.devices.list_for_user(user.id).await?)
    }

    /// Remove a trusted device. The next login from it will be challenged.
    pub async fn remove_device(
        &self,
        user: &User,
        device_id: Uuid,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        let removed = self.repos.devices.remove(user.id, device_id).await?;
        if !removed {
            return Err(ApiError::not_found("Device"));
        }

        let device_id_str = device_id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("trusted_devices");
        event.resource_id = Some(&device_id_str);
        self.audit.success(AuditAction::DeviceRemoved, event).await;

        Ok(())
    }

    /// Change the password after verifying the current one. The candidate
    /// must differ from the current password and from the recent history;
    /// the old credential is retired into history before being overwritten.
    pub async fn change_password(
        &self,
        user: &User,
        request: ChangePasswordRequest,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        let user_id_str = user.id.to_string();

        if !self
            .hasher
            .verify(&request.current_password, &user.salt, &user.hashed_password)
            .await?
        {
            let mut event = self.event(meta);
            event.user_id = Some(user.id);
            event.resource = Some("users");
            event.resource_id = Some(&user_id_str);
            event.details = Some(json!({ "reason": "incorrect_current_password" }));
            self.audit.failure(AuditAction::PasswordChange, event).await;
            return Err(ApiError::validation("Current password is incorrect"));
        }

        if self
            .hasher
            .verify(&request.new_password, &user.salt, &user.hashed_password)
            .await?
        {
            return Err(ApiError::validation("Cannot reuse recent passwords"));
        }
        let history = self
            .repos
            .password_history
            .recent_for_user(user.id, self.password_history_depth)
            .await?;
        for entry in &history {
            if self
                .hasher
                .verify(&request.new_password, &entry.salt, &entry.hashed_password)
                .await?
            {
                return Err(ApiError::validation("Cannot reuse recent passwords"));
            }
        }

        self.repos
            .password_history
            .append(user.id, &user.hashed_password, &user.salt)
            .await?;

        let salt = generate_salt();
        let hashed_password = self.hasher.hash(&request.new_password, &salt).await?;
        self.repos
            .users
            .update_password(user.id, &hashed_password, &salt)
            .await?;

        self.dispatch(NotifyMessage::PasswordChanged {
            to: user.email.clone(),
        });

        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit.success(AuditAction::PasswordChange, event).await;

        Ok(())
    }

    /// Decrypted profile view; an account with no profile row gets an empty
    /// object rather than a 404.
    pub async fn get_profile(&self, user: &User, meta: &ClientMeta) -> ApiResult<ProfileResponse> {
        let response = match self.repos.profiles.find_by_user(user.id).await? {
            Some(profile) => self.decrypted_view(&profile)?,
            None => ProfileResponse::default(),
        };

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("user_profiles");
        event.resource_id = Some(&user_id_str);
        self.audit.success(AuditAction::ProfileAccess, event).await;

        Ok(response)
    }

    /// Upsert the profile, encrypting the sensitive fields first. Absent
    /// fields keep their stored values.
    pub async fn save_profile(
        &self,
        user: &User,
        payload: ProfilePayload,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        let Value::Object(mut map) = serde_json::to_value(&payload)? else {
            return Err(ApiError::internal("Profile payload is not a JSON object"));
        };
        self.cipher.encrypt_profile(&mut map)?;
        let encrypted: ProfilePayload = serde_json::from_value(Value::Object(map))?;

        let profile = self.repos.profiles.upsert(user.id, &encrypted).await?;

        let profile_id_str = profile.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("user_profiles");
        event.resource_id = Some(&profile_id_str);
        self.audit.success(AuditAction::ProfileUpdate, event).await;

        Ok(())
    }

    fn decrypted_view(&self, profile: &UserProfile) -> ApiResult<ProfileResponse> {
        let Value::Object(mut map) = serde_json::to_value(profile)? else {
            return Err(ApiError::internal("Profile row is not a JSON object"));
        };
        self.cipher.decrypt_profile(&mut map);
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Send a notification without blocking the request; delivery failures
    /// are logged and otherwise ignored.
    fn dispatch(&self, message: NotifyMessage) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let kind = message.kind();
            let to = message.to().to_string();
            if let Err(e) = notifier.notify(message).await {
                warn!(kind, to = %to, error = %e, "Failed to send notification email");
            }
        });
    }

    fn event<'a>(&self, meta: &'a ClientMeta) -> AuditEvent<'a> {
        AuditEvent {
            ip_address: Some(meta.ip.as_str()),
            user_agent: Some(meta.user_agent.as_str()),
            ..AuditEvent::default()
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
