//! Authentication orchestrator
//!
//! Drives the signup / verify / login / device-trust state machine over the
//! persistent user store and the ephemeral Redis records. Registration is
//! staged in Redis and only materialized into Postgres once the emailed code
//! comes back, so abandoned signups expire without leaving rows behind.
//! Notification emails are dispatched fire-and-forget; a mail outage must
//! never block a login.

use std::sync::Arc;

use chrono::Utc;
use email_service::{Notifier, NotifyMessage};
use serde_json::json;
use tracing::{error, warn};

use crate::auth::db::AuthRepository;
use crate::auth::models::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResendVerificationRequest,
    ResetPasswordRequest, User, VerifyDeviceRequest, VerifyEmailRequest,
};
use crate::auth::security::{
    codes_match, device_fingerprint, generate_challenge_id, generate_refresh_token, generate_salt,
    generate_verification_code, PasswordHasher,
};
use crate::auth::store::{
    DeviceChallenge, EphemeralStore, PasswordResetChallenge, PendingRegistration,
};
use crate::auth::tokens::JwtService;
use crate::error::{ApiError, ApiResult};
use crate::middleware::ClientMeta;
use crate::services::{AuditAction, AuditEvent, AuditRecorder};

/// A fully issued session: the account plus both tokens
#[derive(Debug)]
pub struct SessionBundle {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// What a correct password gets you: a session, or a device challenge when
/// the fingerprint is not yet trusted
#[derive(Debug)]
pub enum LoginOutcome {
    Session(SessionBundle),
    DeviceChallenge { challenge_id: String },
}

#[derive(Clone)]
pub struct AuthService {
    repos: AuthRepository,
    store: EphemeralStore,
    hasher: PasswordHasher,
    jwt: JwtService,
    notifier: Arc<dyn Notifier>,
    audit: AuditRecorder,
    verification_code_ttl: u64,
    refresh_token_ttl: u64,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: AuthRepository,
        store: EphemeralStore,
        hasher: PasswordHasher,
        jwt: JwtService,
        notifier: Arc<dyn Notifier>,
        audit: AuditRecorder,
        verification_code_ttl: u64,
        refresh_token_ttl: u64,
    ) -> Self {
        Self {
            repos,
            store,
            hasher,
            jwt,
            notifier,
            audit,
            verification_code_ttl,
            refresh_token_ttl,
        }
    }

    /// Stage a registration in Redis and email the verification code. No
    /// user row is created until the code is verified.
    pub async fn register(&self, request: RegisterRequest, meta: &ClientMeta) -> ApiResult<()> {
        let email = request.email.to_lowercase();
        if self.repos.users.find_by_email(&email).await?.is_some() {
            return Err(ApiError::conflict("Email already registered"));
        }
        if self
            .store
            .get_pending_registration(&email)
            .await?
            .is_some()
        {
            return Err(ApiError::conflict(
                "Verification code already sent. Please check your email.",
            ));
        }

        let salt = generate_salt();
        let hashed_password = self.hasher.hash(&request.password, &salt).await?;
        let code = generate_verification_code();

        let record = PendingRegistration {
            email: email.clone(),
            name: request.name,
            hashed_password,
            salt,
            role: request.role.unwrap_or_default(),
            verification_code: code.clone(),
            created_at: Utc::now().timestamp(),
        };
        self.store
            .put_pending_registration(&record, self.verification_code_ttl)
            .await?;

        self.dispatch(NotifyMessage::RegistrationCode {
            to: email.clone(),
            code,
        });

        let mut event = self.event(meta);
        event.resource = Some("users");
        event.details = Some(json!({ "email": email }));
        self.audit.success(AuditAction::Signup, event).await;

        Ok(())
    }

    /// Replace the staged code and reset its expiry window. Requires a live
    /// pending registration.
    pub async fn resend_verification(&self, request: ResendVerificationRequest) -> ApiResult<()> {
        let email = request.email.to_lowercase();
        let Some(mut record) = self.store.get_pending_registration(&email).await? else {
            return Err(ApiError::bad_request(
                "No pending verification found. Please register again.",
            ));
        };

        let code = generate_verification_code();
        record.verification_code = code.clone();
        self.store
            .put_pending_registration(&record, self.verification_code_ttl)
            .await?;

        self.dispatch(NotifyMessage::RegistrationCode { to: email, code });
        Ok(())
    }

    /// Materialize the account once the emailed code comes back. A wrong
    /// code keeps the staged registration so the user can retry until the
    /// TTL runs out.
    pub async fn verify_email(
        &self,
        request: VerifyEmailRequest,
        meta: &ClientMeta,
    ) -> ApiResult<User> {
        let email = request.email.to_lowercase();
        let Some(record) = self.store.get_pending_registration(&email).await? else {
            return Err(ApiError::bad_request("Verification code expired or invalid"));
        };
        if !codes_match(&request.code, &record.verification_code) {
            return Err(ApiError::bad_request("Invalid verification code"));
        }

        // The staged record is deleted only after the insert succeeds, so a
        // failed insert leaves the registration inspectable and retryable.
        let user = match self
            .repos
            .users
            .create(
                &record.email,
                &record.name,
                &record.hashed_password,
                &record.salt,
                record.role,
                true,
            )
            .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(email = %record.email, error = %e, "Database error during user creation");
                return Err(ApiError::internal("Database error during user creation"));
            }
        };
        self.store.delete_pending_registration(&record.email).await?;

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit.success(AuditAction::Verification, event).await;

        Ok(user)
    }

    /// Check credentials, then device trust. Unknown email and wrong
    /// password produce the same error so accounts cannot be enumerated.
    pub async fn login(&self, request: LoginRequest, meta: &ClientMeta) -> ApiResult<LoginOutcome> {
        let email = request.email.to_lowercase();
        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            let mut event = self.event(meta);
            event.details = Some(json!({ "reason": "invalid_credentials" }));
            self.audit.failure(AuditAction::Login, event).await;
            return Err(ApiError::authentication("Invalid credentials"));
        };

        let user_id_str = user.id.to_string();
        if !user.is_active {
            self.audit_login_failure(&user, &user_id_str, "account_disabled", meta)
                .await;
            return Err(ApiError::authorization("Account disabled"));
        }
        if !user.is_verified {
            self.audit_login_failure(&user, &user_id_str, "account_not_verified", meta)
                .await;
            return Err(ApiError::authorization(
                "Account not verified. Please verify your email first.",
            ));
        }
        if !self
            .hasher
            .verify(&request.password, &user.salt, &user.hashed_password)
            .await?
        {
            self.audit_login_failure(&user, &user_id_str, "invalid_credentials", meta)
                .await;
            return Err(ApiError::authentication("Invalid credentials"));
        }

        let fingerprint = request
            .device_fingerprint
            .unwrap_or_else(|| device_fingerprint(&meta.ip, &meta.user_agent));

        let device_count = self.repos.devices.count_for_user(user.id).await?;
        let mut details = None;
        if device_count == 0 {
            // First login after verification: trust this device so the user
            // is not immediately challenged on the account they just created.
            self.repos.devices.register(user.id, &fingerprint).await?;
            details = Some(json!({ "bootstrap_device": true }));
        } else {
            match self
                .repos
                .devices
                .find_by_fingerprint(user.id, &fingerprint)
                .await?
            {
                Some(device) => self.repos.devices.touch(device.id).await?,
                None => return self.challenge_device(user, fingerprint, meta).await,
            }
        }

        let bundle = self.issue_session(user).await?;

        let mut event = self.event(meta);
        event.user_id = Some(bundle.user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        event.details = details;
        self.audit.success(AuditAction::Login, event).await;

        Ok(LoginOutcome::Session(bundle))
    }

    /// Trade a device-challenge code for a session, registering the
    /// fingerprint as trusted. A wrong code keeps the challenge alive.
    pub async fn verify_device(
        &self,
        request: VerifyDeviceRequest,
        meta: &ClientMeta,
    ) -> ApiResult<SessionBundle> {
        let email = request.email.to_lowercase();
        let Some(challenge) = self.store.get_device_challenge(&email).await? else {
            return Err(ApiError::bad_request("Verification code expired or invalid"));
        };
        if !codes_match(&request.code, &challenge.code) {
            return Err(ApiError::bad_request("Invalid verification code"));
        }

        // A caller that computed its own fingerprint wins over the candidate
        // captured at login time.
        let fingerprint = request
            .device_fingerprint
            .unwrap_or(challenge.device_fingerprint);

        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            return Err(ApiError::not_found("User"));
        };

        self.repos.devices.register(user.id, &fingerprint).await?;
        self.store.delete_device_challenge(&email).await?;

        let bundle = self.issue_session(user).await?;

        let user_id_str = bundle.user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(bundle.user.id);
        event.resource = Some("trusted_devices");
        event.resource_id = Some(&user_id_str);
        self.audit
            .success(AuditAction::DeviceVerification, event)
            .await;

        Ok(bundle)
    }

    /// Mint a fresh access token for a live refresh token. Refresh tokens
    /// are not rotated on use; the same token stays valid until its TTL or
    /// an explicit revocation.
    pub async fn refresh(&self, token: &str, meta: &ClientMeta) -> ApiResult<String> {
        let Some(owner) = self.store.refresh_token_owner(token).await? else {
            return Err(ApiError::authentication("Invalid or expired refresh token"));
        };

        let user = match self.repos.users.find_by_id(owner).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.store.revoke_refresh_token(token).await?;
                return Err(ApiError::authentication("User not found or inactive"));
            }
        };

        let access_token = self.jwt.issue(user.id, &user.email, user.role.as_str())?;

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit.success(AuditAction::TokenRefresh, event).await;

        Ok(access_token)
    }

    /// Revoke the presented refresh token. Best-effort and idempotent:
    /// logout must succeed even when the store is down or the token is
    /// already gone.
    pub async fn logout(&self, refresh_token: Option<&str>, meta: &ClientMeta) {
        let mut user_id = None;
        if let Some(token) = refresh_token {
            match self.store.refresh_token_owner(token).await {
                Ok(owner) => user_id = owner,
                Err(e) => warn!(error = %e, "Failed to resolve refresh token during logout"),
            }
            if let Err(e) = self.store.revoke_refresh_token(token).await {
                warn!(error = %e, "Failed to revoke refresh token during logout");
            }
        }

        let user_id_str = user_id.map(|id| id.to_string());
        let mut event = self.event(meta);
        event.user_id = user_id;
        event.resource = Some("users");
        event.resource_id = user_id_str.as_deref();
        self.audit.success(AuditAction::Logout, event).await;
    }

    /// Stage a reset challenge and email the code. The response is constant
    /// whether or not the account exists.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        let email = request.email.to_lowercase();
        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            return Ok(());
        };

        let code = generate_verification_code();
        let challenge = PasswordResetChallenge {
            email: user.email.clone(),
            code: code.clone(),
            created_at: Utc::now().timestamp(),
        };
        self.store
            .put_reset_challenge(&challenge, self.verification_code_ttl)
            .await?;

        self.dispatch(NotifyMessage::ResetCode {
            to: user.email.clone(),
            code,
        });

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit
            .success(AuditAction::PasswordResetRequest, event)
            .await;

        Ok(())
    }

    /// Trade a reset code for a new password. Absent challenge and wrong
    /// code collapse into one error so the response does not reveal whether
    /// a reset was ever requested.
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        meta: &ClientMeta,
    ) -> ApiResult<()> {
        let email = request.email.to_lowercase();
        let Some(challenge) = self.store.get_reset_challenge(&email).await? else {
            return Err(ApiError::bad_request("Invalid or expired reset code"));
        };
        if !codes_match(&request.code, &challenge.code) {
            return Err(ApiError::bad_request("Invalid or expired reset code"));
        }

        let Some(user) = self.repos.users.find_by_email(&email).await? else {
            return Err(ApiError::not_found("User"));
        };

        let salt = generate_salt();
        let hashed_password = self.hasher.hash(&request.new_password, &salt).await?;
        self.repos
            .users
            .update_password(user.id, &hashed_password, &salt)
            .await?;
        self.store.delete_reset_challenge(&email).await?;

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        self.audit.success(AuditAction::PasswordReset, event).await;

        Ok(())
    }

    /// Park the login behind an emailed code because the fingerprint is not
    /// trusted yet. No tokens are issued on this path.
    async fn challenge_device(
        &self,
        user: User,
        fingerprint: String,
        meta: &ClientMeta,
    ) -> ApiResult<LoginOutcome> {
        let code = generate_verification_code();
        let challenge_id = generate_challenge_id();
        let challenge = DeviceChallenge {
            email: user.email.clone(),
            code: code.clone(),
            device_fingerprint: fingerprint,
            challenge_id: challenge_id.clone(),
            created_at: Utc::now().timestamp(),
        };
        self.store
            .put_device_challenge(&challenge, self.verification_code_ttl)
            .await?;

        self.dispatch(NotifyMessage::DeviceCode {
            to: user.email.clone(),
            code,
        });

        let user_id_str = user.id.to_string();
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(&user_id_str);
        event.details = Some(json!({ "device_challenge": true }));
        self.audit.success(AuditAction::Login, event).await;

        Ok(LoginOutcome::DeviceChallenge { challenge_id })
    }

    async fn issue_session(&self, user: User) -> ApiResult<SessionBundle> {
        let access_token = self.jwt.issue(user.id, &user.email, user.role.as_str())?;
        let refresh_token = generate_refresh_token();
        self.store
            .store_refresh_token(
                user.id,
                &user.email,
                &refresh_token,
                self.refresh_token_ttl,
                Utc::now().timestamp(),
            )
            .await?;
        Ok(SessionBundle {
            user,
            access_token,
            refresh_token,
        })
    }

    async fn audit_login_failure(
        &self,
        user: &User,
        user_id_str: &str,
        reason: &str,
        meta: &ClientMeta,
    ) {
        let mut event = self.event(meta);
        event.user_id = Some(user.id);
        event.resource = Some("users");
        event.resource_id = Some(user_id_str);
        event.details = Some(json!({ "reason": reason }));
        self.audit.failure(AuditAction::Login, event).await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use email_service::NullNotifier;

    use crate::auth::models::UserRole;
    use crate::auth::testing::{memory_repository, MemoryKv};

    const EMAIL: &str = "pat@example.com";
    const PASSWORD: &str = "P@ssw0rd1!";

    struct Harness {
        auth: AuthService,
        store: EphemeralStore,
        repos: AuthRepository,
    }

    fn harness() -> Harness {
        let repos = memory_repository();
        let store = EphemeralStore::new(MemoryKv::default());
        let auth = AuthService::new(
            repos.clone(),
            store.clone(),
            PasswordHasher::new().unwrap(),
            JwtService::new("test-secret", Duration::from_secs(900)),
            Arc::new(NullNotifier),
            AuditRecorder::new(repos.audit_logs.clone()),
            600,
            7 * 24 * 3600,
        );
        Harness { auth, store, repos }
    }

    fn meta() -> ClientMeta {
        ClientMeta {
            ip: "203.0.113.9".to_string(),
            user_agent: "test-agent/1.0".to_string(),
        }
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: EMAIL.to_string(),
            name: "Pat Doe".to_string(),
            password: PASSWORD.to_string(),
            role: None,
        }
    }

    fn wrong_code(code: &str) -> String {
        if code == "000000" {
            "000001".to_string()
        } else {
            "000000".to_string()
        }
    }

    /// Register and return the staged verification code
    async fn registered(h: &Harness) -> String {
        h.auth.register(register_request(), &meta()).await.unwrap();
        h.store
            .get_pending_registration(EMAIL)
            .await
            .unwrap()
            .unwrap()
            .verification_code
    }

    /// Run the full signup + verify flow and return the new account
    async fn verified_user(h: &Harness) -> User {
        let code = registered(h).await;
        h.auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code,
                },
                &meta(),
            )
            .await
            .unwrap()
    }

    async fn login_with(
        h: &Harness,
        password: &str,
        fingerprint: &str,
    ) -> ApiResult<LoginOutcome> {
        h.auth
            .login(
                LoginRequest {
                    email: EMAIL.to_string(),
                    password: password.to_string(),
                    device_fingerprint: Some(fingerprint.to_string()),
                },
                &meta(),
            )
            .await
    }

    #[tokio::test]
    async fn test_verify_email_materializes_account_exactly_once() {
        let h = harness();
        let code = registered(&h).await;

        let user = h
            .auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code: code.clone(),
                },
                &meta(),
            )
            .await
            .unwrap();
        assert_eq!(user.email, EMAIL);
        assert!(user.is_verified);
        assert!(user.is_active);

        // The staged registration is consumed; replaying the code fails
        assert!(h
            .store
            .get_pending_registration(EMAIL)
            .await
            .unwrap()
            .is_none());
        let err = h
            .auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code,
                },
                &meta(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_signup_rejected_while_verification_pending() {
        let h = harness();
        h.auth.register(register_request(), &meta()).await.unwrap();

        let err = h
            .auth
            .register(register_request(), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_signup_rejected_for_existing_account() {
        let h = harness();
        verified_user(&h).await;

        let err = h
            .auth
            .register(register_request(), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_registration_retryable() {
        let h = harness();
        let code = registered(&h).await;

        let err = h
            .auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code: wrong_code(&code),
                },
                &meta(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
        assert!(h
            .store
            .get_pending_registration(EMAIL)
            .await
            .unwrap()
            .is_some());

        // The correct code still works after the failed attempt
        h.auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code,
                },
                &meta(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resend_requires_pending_and_rotates_code() {
        let h = harness();

        let err = h
            .auth
            .resend_verification(ResendVerificationRequest {
                email: EMAIL.to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));

        registered(&h).await;
        h.auth
            .resend_verification(ResendVerificationRequest {
                email: EMAIL.to_string(),
            })
            .await
            .unwrap();

        // Whatever code is staged after the resend is the one that verifies
        let rotated = h
            .store
            .get_pending_registration(EMAIL)
            .await
            .unwrap()
            .unwrap()
            .verification_code;
        h.auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code: rotated,
                },
                &meta(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_materialization_keeps_staged_registration() {
        let h = harness();
        let code = registered(&h).await;

        // The email gets taken between signup and verify
        let hasher = PasswordHasher::new().unwrap();
        let salt = generate_salt();
        let hash = hasher.hash("Other-Pass-1!", &salt).await.unwrap();
        h.repos
            .users
            .create(EMAIL, "Other", &hash, &salt, UserRole::Patient, true)
            .await
            .unwrap();

        let err = h
            .auth
            .verify_email(
                VerifyEmailRequest {
                    email: EMAIL.to_string(),
                    code,
                },
                &meta(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal { .. }));

        // Staged data stays behind for inspection, not silently dropped
        assert!(h
            .store
            .get_pending_registration(EMAIL)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_first_login_bootstraps_device_trust() {
        let h = harness();
        let user = verified_user(&h).await;

        let outcome = login_with(&h, PASSWORD, "fp-one").await.unwrap();
        let LoginOutcome::Session(bundle) = outcome else {
            panic!("first login must not be challenged");
        };
        assert!(!bundle.access_token.is_empty());
        assert!(!bundle.refresh_token.is_empty());
        assert_eq!(h.repos.devices.count_for_user(user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_parks_login_behind_challenge() {
        let h = harness();
        let user = verified_user(&h).await;
        login_with(&h, PASSWORD, "fp-one").await.unwrap();

        let outcome = login_with(&h, PASSWORD, "fp-two").await.unwrap();
        let LoginOutcome::DeviceChallenge { challenge_id } = outcome else {
            panic!("second fingerprint must be challenged");
        };
        assert!(!challenge_id.is_empty());

        // No session, no new trust until the code comes back
        assert_eq!(h.repos.devices.count_for_user(user.id).await.unwrap(), 1);
        let challenge = h.store.get_device_challenge(EMAIL).await.unwrap().unwrap();
        assert_eq!(challenge.device_fingerprint, "fp-two");
        assert_eq!(challenge.challenge_id, challenge_id);
    }

    #[tokio::test]
    async fn test_verify_device_trusts_second_fingerprint() {
        let h = harness();
        let user = verified_user(&h).await;
        login_with(&h, PASSWORD, "fp-one").await.unwrap();
        login_with(&h, PASSWORD, "fp-two").await.unwrap();

        let code = h
            .store
            .get_device_challenge(EMAIL)
            .await
            .unwrap()
            .unwrap()
            .code;
        let bundle = h
            .auth
            .verify_device(
                VerifyDeviceRequest {
                    email: EMAIL.to_string(),
                    code,
                    device_fingerprint: None,
                },
                &meta(),
            )
            .await
            .unwrap();

        assert!(!bundle.access_token.is_empty());
        assert_eq!(h.repos.devices.count_for_user(user.id).await.unwrap(), 2);
        assert!(h
            .repos
            .devices
            .find_by_fingerprint(user.id, "fp-two")
            .await
            .unwrap()
            .is_some());
        assert!(h.store.get_device_challenge(EMAIL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_device_wrong_code_changes_nothing() {
        let h = harness();
        let user = verified_user(&h).await;
        login_with(&h, PASSWORD, "fp-one").await.unwrap();
        login_with(&h, PASSWORD, "fp-two").await.unwrap();

        let code = h
            .store
            .get_device_challenge(EMAIL)
            .await
            .unwrap()
            .unwrap()
            .code;
        let err = h
            .auth
            .verify_device(
                VerifyDeviceRequest {
                    email: EMAIL.to_string(),
                    code: wrong_code(&code),
                    device_fingerprint: None,
                },
                &meta(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::BadRequest { .. }));
        assert_eq!(h.repos.devices.count_for_user(user.id).await.unwrap(), 1);
        assert!(h.store.get_device_challenge(EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_failures_do_not_reveal_which_part_was_wrong() {
        let h = harness();
        verified_user(&h).await;

        let unknown = h
            .auth
            .login(
                LoginRequest {
                    email: "ghost@example.com".to_string(),
                    password: PASSWORD.to_string(),
                    device_fingerprint: None,
                },
                &meta(),
            )
            .await
            .unwrap_err();
        let mismatch = login_with(&h, "Wrong-Pass-1!", "fp-one").await.unwrap_err();

        assert!(matches!(unknown, ApiError::Authentication { .. }));
        assert!(matches!(mismatch, ApiError::Authentication { .. }));
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[tokio::test]
    async fn test_login_blocked_for_deactivated_account() {
        let h = harness();
        let user = verified_user(&h).await;
        h.repos.users.deactivate(user.id).await.unwrap();

        let err = login_with(&h, PASSWORD, "fp-one").await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization { .. }));
    }

    #[tokio::test]
    async fn test_login_blocked_before_verification() {
        let h = harness();
        let hasher = PasswordHasher::new().unwrap();
        let salt = generate_salt();
        let hash = hasher.hash(PASSWORD, &salt).await.unwrap();
        h.repos
            .users
            .create(EMAIL, "Pat Doe", &hash, &salt, UserRole::Patient, false)
            .await
            .unwrap();

        let err = login_with(&h, PASSWORD, "fp-one").await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization { .. }));
    }

    #[tokio::test]
    async fn test_refresh_and_logout_lifecycle() {
        let h = harness();
        verified_user(&h).await;
        let LoginOutcome::Session(bundle) = login_with(&h, PASSWORD, "fp-one").await.unwrap()
        else {
            panic!("first login must not be challenged");
        };

        // Not rotated on use: the same refresh token keeps working
        assert!(!h.auth.refresh(&bundle.refresh_token, &meta()).await.unwrap().is_empty());
        h.auth.refresh(&bundle.refresh_token, &meta()).await.unwrap();

        h.auth.logout(Some(&bundle.refresh_token), &meta()).await;
        let err = h
            .auth
            .refresh(&bundle.refresh_token, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authentication { .. }));

        // Logout is idempotent, with or without a token
        h.auth.logout(Some(&bundle.refresh_token), &meta()).await;
        h.auth.logout(None, &meta()).await;
    }

    #[tokio::test]
    async fn test_refresh_revokes_token_for_deactivated_account() {
        let h = harness();
        let user = verified_user(&h).await;
        let LoginOutcome::Session(bundle) = login_with(&h, PASSWORD, "fp-one").await.unwrap()
        else {
            panic!("first login must not be challenged");
        };

        h.repos.users.deactivate(user.id).await.unwrap();

        let err = h
            .auth
            .refresh(&bundle.refresh_token, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authentication { .. }));
        // The dead session's token is gone, not just rejected
        assert!(h
            .store
            .refresh_token_owner(&bundle.refresh_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_forgot_password_is_silent_for_unknown_email() {
        let h = harness();
        h.auth
            .forgot_password(
                ForgotPasswordRequest {
                    email: "ghost@example.com".to_string(),
                },
                &meta(),
            )
            .await
            .unwrap();
        assert!(h
            .store
            .get_reset_challenge("ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reset_password_with_emailed_code() {
        let h = harness();
        verified_user(&h).await;
        h.auth
            .forgot_password(
                ForgotPasswordRequest {
                    email: EMAIL.to_string(),
                },
                &meta(),
            )
            .await
            .unwrap();
        let code = h.store.get_reset_challenge(EMAIL).await.unwrap().unwrap().code;

        let err = h
            .auth
            .reset_password(
                ResetPasswordRequest {
                    email: EMAIL.to_string(),
                    code: wrong_code(&code),
                    new_password: "Fresh-Pass-1!".to_string(),
                },
                &meta(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
        assert!(h.store.get_reset_challenge(EMAIL).await.unwrap().is_some());

        h.auth
            .reset_password(
                ResetPasswordRequest {
                    email: EMAIL.to_string(),
                    code,
                    new_password: "Fresh-Pass-1!".to_string(),
                },
                &meta(),
            )
            .await
            .unwrap();
        assert!(h.store.get_reset_challenge(EMAIL).await.unwrap().is_none());

        // Old credential is dead, the new one logs in
        let err = login_with(&h, PASSWORD, "fp-one").await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication { .. }));
        assert!(matches!(
            login_with(&h, "Fresh-Pass-1!", "fp-one").await.unwrap(),
            LoginOutcome::Session(_)
        ));
    }
}
