// Outbound notification channel backed by SMTP
use crate::error::{NotifyError, NotifyResult};
use async_trait::async_trait;
use mail_builder::MessageBuilder;
use mail_send::SmtpClientBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// SMTP delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub email_enabled: bool,
}

impl SmtpConfig {
    /// Load SMTP configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_TLS_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            from_email: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@carevault.dev".to_string()),
            from_name: std::env::var("EMAIL_FROM_NAME")
                .unwrap_or_else(|_| "CareVault".to_string()),
            email_enabled: std::env::var("EMAIL_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }
}

/// One outbound notification, addressed and typed
#[derive(Debug, Clone)]
pub enum NotifyMessage {
    /// Verification code for a pending registration
    RegistrationCode { to: String, code: String },
    /// Verification code for a sign-in from an unrecognized device
    DeviceCode { to: String, code: String },
    /// Password reset code
    ResetCode { to: String, code: String },
    /// Notice that the account password was changed
    PasswordChanged { to: String },
}

impl NotifyMessage {
    pub fn to(&self) -> &str {
        match self {
            Self::RegistrationCode { to, .. }
            | Self::DeviceCode { to, .. }
            | Self::ResetCode { to, .. }
            | Self::PasswordChanged { to } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationCode { .. } => "registration_code",
            Self::DeviceCode { .. } => "device_code",
            Self::ResetCode { .. } => "reset_code",
            Self::PasswordChanged { .. } => "password_changed",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::RegistrationCode { .. } => "Verify your CareVault account",
            Self::DeviceCode { .. } => "Verify your new device",
            Self::ResetCode { .. } => "Reset your CareVault password",
            Self::PasswordChanged { .. } => "Your CareVault password was changed",
        }
    }

    pub fn text_body(&self) -> String {
        match self {
            Self::RegistrationCode { code, .. } => format!(
                "Welcome to CareVault!\n\n\
                 Your verification code is: {code}\n\n\
                 Enter this code to finish creating your account. \
                 The code expires in 10 minutes.\n\n\
                 If you did not sign up, you can ignore this message."
            ),
            Self::DeviceCode { code, .. } => format!(
                "A sign-in to your CareVault account was attempted from a device \
                 we don't recognize.\n\n\
                 Your device verification code is: {code}\n\n\
                 Enter this code to continue signing in. \
                 The code expires in 10 minutes.\n\n\
                 If this wasn't you, change your password immediately."
            ),
            Self::ResetCode { code, .. } => format!(
                "A password reset was requested for your CareVault account.\n\n\
                 Your reset code is: {code}\n\n\
                 The code expires in 10 minutes.\n\n\
                 If you did not request a reset, you can ignore this message."
            ),
            Self::PasswordChanged { .. } => "The password for your CareVault account \
                 was just changed.\n\n\
                 If this was you, no action is needed. If not, use the password \
                 reset flow right away and contact support."
                .to_string(),
        }
    }
}

/// Capability to deliver a notification to a user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: NotifyMessage) -> NotifyResult<()>;
}

/// Delivers notifications over SMTP using the Stalwart mail libraries
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    async fn send_message(&self, message: MessageBuilder<'_>) -> NotifyResult<String> {
        let mut smtp_client =
            SmtpClientBuilder::new(self.config.host.clone(), self.config.port)
                .implicit_tls(self.config.use_tls);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            smtp_client = smtp_client.credentials((user.clone(), pass.clone()));
        }

        let mut client = smtp_client
            .connect()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("SMTP connection failed: {e}")))?;

        let message_id = Uuid::new_v4().to_string();
        client
            .send(message)
            .await
            .map_err(|e| NotifyError::SendFailed(format!("Failed to send email: {e}")))?;

        debug!(message_id = %message_id, "Email sent successfully");
        Ok(message_id)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, message: NotifyMessage) -> NotifyResult<()> {
        let builder = MessageBuilder::new()
            .from((
                self.config.from_name.clone(),
                self.config.from_email.clone(),
            ))
            .to(message.to().to_string())
            .subject(message.subject())
            .text_body(message.text_body());

        let message_id = self.send_message(builder).await?;
        info!(
            kind = message.kind(),
            message_id = %message_id,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Accepts every notification without delivering it.
///
/// Used when email is disabled and in tests.
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, message: NotifyMessage) -> NotifyResult<()> {
        debug!(
            kind = message.kind(),
            to = message.to(),
            "Email disabled, notification dropped"
        );
        Ok(())
    }
}

/// Build the notifier selected by the environment.
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    let config = SmtpConfig::from_env();
    if config.email_enabled {
        info!(host = %config.host, port = config.port, "SMTP notifier enabled");
        Arc::new(SmtpNotifier::new(config))
    } else {
        info!("Email disabled, using null notifier");
        Arc::new(NullNotifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_config_from_env() {
        std::env::set_var("SMTP_HOST", "mail.example.com");
        std::env::set_var("SMTP_PORT", "2525");
        std::env::set_var("EMAIL_ENABLED", "true");

        let config = SmtpConfig::from_env();
        assert_eq!(config.host, "mail.example.com");
        assert_eq!(config.port, 2525);
        assert!(config.email_enabled);
    }

    #[test]
    fn test_message_bodies_carry_code() {
        let message = NotifyMessage::RegistrationCode {
            to: "user@example.com".to_string(),
            code: "483921".to_string(),
        };
        assert_eq!(message.to(), "user@example.com");
        assert!(message.text_body().contains("483921"));

        let message = NotifyMessage::DeviceCode {
            to: "user@example.com".to_string(),
            code: "104593".to_string(),
        };
        assert!(message.text_body().contains("104593"));

        let message = NotifyMessage::ResetCode {
            to: "user@example.com".to_string(),
            code: "761038".to_string(),
        };
        assert!(message.text_body().contains("761038"));
    }

    #[test]
    fn test_subjects_distinguish_kinds() {
        let registration = NotifyMessage::RegistrationCode {
            to: String::new(),
            code: String::new(),
        };
        let changed = NotifyMessage::PasswordChanged { to: String::new() };
        assert_ne!(registration.subject(), changed.subject());
        assert_eq!(changed.kind(), "password_changed");
    }

    #[tokio::test]
    async fn test_null_notifier_accepts_everything() {
        let notifier = NullNotifier;
        let result = notifier
            .notify(NotifyMessage::PasswordChanged {
                to: "user@example.com".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}
