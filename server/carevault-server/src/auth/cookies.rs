//! Session cookie construction
//!
//! Both tokens travel as HttpOnly cookies. The refresh cookie is scoped to
//! the refresh endpoint path so it is not replayed on every request, and uses
//! SameSite=Strict since only the app itself ever calls refresh.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderValue;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Debug, Clone)]
pub struct CookiePolicy {
    secure: bool,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl CookiePolicy {
    pub fn new(secure: bool, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            secure,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn access_cookie(&self, token: &str) -> ApiResult<HeaderValue> {
        self.build(ACCESS_COOKIE, token, "/", "Lax", self.access_ttl_seconds)
    }

    pub fn refresh_cookie(&self, token: &str) -> ApiResult<HeaderValue> {
        self.build(
            REFRESH_COOKIE,
            token,
            REFRESH_PATH,
            "Strict",
            self.refresh_ttl_seconds,
        )
    }

    pub fn clear_access_cookie(&self) -> ApiResult<HeaderValue> {
        self.build(ACCESS_COOKIE, "", "/", "Lax", 0)
    }

    pub fn clear_refresh_cookie(&self) -> ApiResult<HeaderValue> {
        self.build(REFRESH_COOKIE, "", REFRESH_PATH, "Strict", 0)
    }

    fn build(
        &self,
        name: &str,
        value: &str,
        path: &str,
        same_site: &str,
        max_age: i64,
    ) -> ApiResult<HeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path={path}; HttpOnly; SameSite={same_site}; Max-Age={max_age}"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal(format!("Invalid cookie value: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(secure: bool) -> CookiePolicy {
        CookiePolicy::new(secure, 900, 604_800)
    }

    #[test]
    fn test_access_cookie_attributes() {
        let cookie = policy(false).access_cookie("tok").unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("access_token=tok;"));
        assert!(cookie.contains("Path=/;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=900"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_refresh_cookie_is_path_scoped_and_strict() {
        let cookie = policy(true).refresh_cookie("tok").unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.contains("Path=/api/v1/auth/refresh;"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.ends_with("Secure"));
    }

    #[test]
    fn test_clear_cookies_expire_immediately() {
        let access = policy(false).clear_access_cookie().unwrap();
        assert!(access.to_str().unwrap().contains("access_token=;"));
        assert!(access.to_str().unwrap().contains("Max-Age=0"));

        let refresh = policy(false).clear_refresh_cookie().unwrap();
        assert!(refresh.to_str().unwrap().contains("refresh_token=;"));
        assert!(refresh.to_str().unwrap().contains("Max-Age=0"));
    }
}
