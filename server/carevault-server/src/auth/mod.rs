//! Authentication and device-trust subsystem
//!
//! Everything the login lifecycle touches lives here: request/response
//! models, password hashing, JWT issuance, the Redis-backed ephemeral
//! store for pending signups and challenges, Postgres repositories, and
//! the orchestrating [`AuthService`].

pub mod cookies;
pub mod db;
pub mod models;
pub mod rate_limit;
pub mod security;
pub mod service;
pub mod store;
#[cfg(test)]
pub mod testing;
pub mod tokens;

pub use cookies::CookiePolicy;
pub use db::AuthRepository;
pub use rate_limit::{RateLimiter, RateScope};
pub use security::PasswordHasher;
pub use service::{AuthService, LoginOutcome, SessionBundle};
pub use store::EphemeralStore;
pub use tokens::JwtService;
