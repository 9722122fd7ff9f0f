use thiserror::Error;

/// Errors from the notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid notification configuration: {0}")]
    Configuration(String),

    #[error("Failed to send notification: {0}")]
    SendFailed(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
