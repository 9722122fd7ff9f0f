//! Transactional email for CareVault Engine
//!
//! Delivers verification codes and security notices over SMTP. Delivery is
//! behind the [`Notifier`] trait so the server can swap in a no-op
//! implementation when email is disabled.

pub mod error;
pub mod service;

pub use error::{NotifyError, NotifyResult};
pub use service::{
    notifier_from_env, NotifyMessage, Notifier, NullNotifier, SmtpConfig, SmtpNotifier,
};
