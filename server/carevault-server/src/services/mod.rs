//! Cross-cutting services used by the handlers and the auth orchestrator

pub mod account;
pub mod audit;

pub use account::AccountService;
pub use audit::{AuditAction, AuditEvent, AuditRecorder, AuditStatus};
