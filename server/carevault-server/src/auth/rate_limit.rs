//! Fixed-window rate limiting for the auth endpoints
//!
//! Counters live in Redis under `rate:{scope}:{client}`. The window starts
//! on the first hit and is never slid; the increment and the expiry are one
//! Lua script, so a counter can never outlive its window. A Redis failure
//! on this path is logged and lets the request through; the limiter gates
//! abuse, it is not a correctness dependency.

use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use redis::{aio::ConnectionManager, Script};
use tracing::warn;

/// Increment a counter and start its window on the first hit, atomically.
/// Separate INCR and EXPIRE calls can leave a counter with no TTL if the
/// second call is never reached; that key would then 429 its client forever.
const WINDOW_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Signup,
    VerifyEmail,
    ResendVerification,
    Login,
    VerifyDevice,
    ForgotPassword,
    ResetPassword,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::Signup => "signup",
            RateScope::VerifyEmail => "verify_email",
            RateScope::ResendVerification => "resend_verification",
            RateScope::Login => "login",
            RateScope::VerifyDevice => "verify_device",
            RateScope::ForgotPassword => "forgot_password",
            RateScope::ResetPassword => "reset_password",
        }
    }

    /// Maximum hits per window
    pub fn limit(&self) -> i64 {
        match self {
            RateScope::Signup
            | RateScope::VerifyEmail
            | RateScope::Login
            | RateScope::VerifyDevice => 5,
            RateScope::ForgotPassword | RateScope::ResetPassword => 3,
            RateScope::ResendVerification => 2,
        }
    }

    pub fn window_seconds(&self) -> u64 {
        60
    }
}

fn rate_key(scope: RateScope, client: &str) -> String {
    format!("rate:{}:{client}", scope.as_str())
}

#[derive(Clone)]
pub struct RateLimiter {
    redis: ConnectionManager,
    window_script: Arc<Script>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(redis: ConnectionManager, enabled: bool) -> Self {
        Self {
            redis,
            window_script: Arc::new(Script::new(WINDOW_SCRIPT)),
            enabled,
        }
    }

    /// Count one hit for this client; errors with 429 when over the limit
    pub async fn check(&self, scope: RateScope, client: &str) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let key = rate_key(scope, client);
        let count = match self.hit(&key, scope.window_seconds()).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    scope = scope.as_str(),
                    error = %e,
                    "Rate limiter unavailable, allowing request"
                );
                return Ok(());
            }
        };

        if count > scope.limit() {
            return Err(ApiError::rate_limit(scope.window_seconds()));
        }
        Ok(())
    }

    async fn hit(&self, key: &str, window_seconds: u64) -> Result<i64, redis::RedisError> {
        let mut conn = self.redis.clone();
        self.window_script
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_script_couples_expiry_to_first_increment() {
        // The counter and its TTL must be set in one server-side step; a
        // counter without a TTL would lock its client out permanently.
        let increment = WINDOW_SCRIPT.find("INCR").expect("script increments");
        let expire = WINDOW_SCRIPT.find("EXPIRE").expect("script sets a TTL");
        assert!(increment < expire);
        assert!(WINDOW_SCRIPT.contains("count == 1"));
        assert!(WINDOW_SCRIPT.contains("ARGV[1]"));
    }

    #[test]
    fn test_rate_keys_are_scoped_per_client() {
        assert_eq!(
            rate_key(RateScope::Login, "203.0.113.9"),
            "rate:login:203.0.113.9"
        );
        assert_ne!(
            rate_key(RateScope::Login, "203.0.113.9"),
            rate_key(RateScope::Signup, "203.0.113.9")
        );
        assert_ne!(
            rate_key(RateScope::Login, "203.0.113.9"),
            rate_key(RateScope::Login, "203.0.113.10")
        );
    }

    #[test]
    fn test_scope_limits() {
        assert_eq!(RateScope::Login.limit(), 5);
        assert_eq!(RateScope::ForgotPassword.limit(), 3);
        assert_eq!(RateScope::ResendVerification.limit(), 2);
        for scope in [
            RateScope::Signup,
            RateScope::VerifyEmail,
            RateScope::ResendVerification,
            RateScope::Login,
            RateScope::VerifyDevice,
            RateScope::ForgotPassword,
            RateScope::ResetPassword,
        ] {
            assert_eq!(scope.window_seconds(), 60);
        }
    }
}
