//! Request-context extraction and the authentication gate
//!
//! `ClientMeta` captures the caller's address and agent string for audit
//! rows and device fingerprinting. `require_auth` validates the access
//! token, loads the account, and parks it in request extensions as an
//! `AuthContext` for handlers to extract.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::cookies::ACCESS_COOKIE;
use crate::auth::models::User;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Where the request came from, as well as proxies let us tell.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

/// Resolve the client address and agent string from request headers.
/// Behind a proxy the first `x-forwarded-for` entry is the real client.
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    ClientMeta { ip, user_agent }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(client_meta(&parts.headers))
    }
}

/// The authenticated account, loaded fresh from the database by
/// `require_auth` so deactivation takes effect immediately.
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| ApiError::authentication("Not authenticated"))
    }
}

/// Gate for the protected subtree: validate the access token, load the
/// account, reject inactive accounts.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = access_token(request.headers())
        .ok_or_else(|| ApiError::authentication("Not authenticated"))?;
    let claims = state.jwt.validate(&token)?;
    let user_id = claims.user_id()?;

    let user = state
        .repos
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::authentication("User not found or inactive"))?;

    request.extensions_mut().insert(AuthContext { user });
    Ok(next.run(request).await)
}

/// Access token from the Authorization header, falling back to the session
/// cookie for browser clients.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, ACCESS_COOKIE))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Pull one cookie out of the Cookie header without a full jar
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}
