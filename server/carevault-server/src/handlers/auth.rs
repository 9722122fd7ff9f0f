//! Authentication endpoints
//!
//! Thin HTTP layer over the auth orchestrator: validate the request, apply
//! the per-endpoint rate limit, run the flow, translate the outcome into a
//! response and its cookies.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use validator::Validate;

use crate::auth::cookies::{CookiePolicy, REFRESH_COOKIE};
use crate::auth::models::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    ResendVerificationRequest, ResetPasswordRequest, UserResponse, VerifyDeviceRequest,
    VerifyEmailRequest,
};
use crate::auth::rate_limit::RateScope;
use crate::auth::service::{LoginOutcome, SessionBundle};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{cookie_value, AuthContext, ClientMeta};
use crate::server::AppState;

/// Stage a new registration and send the verification code
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration staged, verification email sent", body = MessageResponse),
        (status = 400, description = "Email already registered, verification pending, or weak password"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    request.validate()?;
    state.rate_limiter.check(RateScope::Signup, &meta.ip).await?;

    state.auth.register(request, &meta).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Registration successful. Please check your email to verify your account.",
        )),
    ))
}

/// Verify the emailed code and materialize the account
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Account created", body = MessageResponse),
        (status = 400, description = "Missing, expired, or wrong code"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    state.rate_limiter.check(RateScope::VerifyEmail, &meta.ip).await?;

    state.auth.verify_email(request, &meta).await?;
    Ok(Json(MessageResponse::new(
        "Email verified successfully. You can now login.",
    )))
}

/// Re-send the verification code for a pending registration
#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-verification",
    tag = "auth",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Code resent", body = MessageResponse),
        (status = 400, description = "No pending registration"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<ResendVerificationRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .rate_limiter
        .check(RateScope::ResendVerification, &meta.ip)
        .await?;

    state.auth.resend_verification(request).await?;
    Ok(Json(MessageResponse::new(
        "Verification code resent. Please check your email.",
    )))
}

/// Log in. A recognized device gets a session; an unrecognized one gets a
/// device challenge and no tokens.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued, or device verification required", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled or not verified"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    request.validate()?;
    state.rate_limiter.check(RateScope::Login, &meta.ip).await?;

    match state.auth.login(request, &meta).await? {
        LoginOutcome::Session(bundle) => session_response(
            &state.cookies,
            "Login successful",
            &bundle,
        ),
        LoginOutcome::DeviceChallenge { challenge_id } => Ok(Json(LoginResponse::challenge(
            "Please verify your device. A code has been sent to your email.",
            challenge_id,
        ))
        .into_response()),
    }
}

/// Verify the device-challenge code and receive a session
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-device",
    tag = "auth",
    request_body = VerifyDeviceRequest,
    responses(
        (status = 200, description = "Device trusted, session issued", body = LoginResponse),
        (status = 400, description = "Missing, expired, or wrong code"),
        (status = 404, description = "Account not found"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn verify_device(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<VerifyDeviceRequest>,
) -> ApiResult<Response> {
    request.validate()?;
    state
        .rate_limiter
        .check(RateScope::VerifyDevice, &meta.ip)
        .await?;

    let bundle = state.auth.verify_device(request, &meta).await?;
    session_response(&state.cookies, "Device verified successfully", &bundle)
}

/// Mint a fresh access token from the refresh cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Access token refreshed", body = MessageResponse),
        (status = 401, description = "Missing, invalid, or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    meta: ClientMeta,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let Some(token) = cookie_value(&headers, REFRESH_COOKIE) else {
        return cleared_failure(
            &state.cookies,
            ApiError::authentication("No refresh token provided"),
        );
    };

    match state.auth.refresh(&token, &meta).await {
        Ok(access_token) => {
            let mut response =
                Json(MessageResponse::new("Token refreshed successfully")).into_response();
            response
                .headers_mut()
                .append(header::SET_COOKIE, state.cookies.access_cookie(&access_token)?);
            Ok(response)
        }
        // A dead session must not leave stale cookies behind
        Err(err @ ApiError::Authentication { .. }) => cleared_failure(&state.cookies, err),
        Err(err) => Err(err),
    }
}

/// Revoke the presented refresh token and clear both cookies
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    meta: ClientMeta,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = cookie_value(&headers, REFRESH_COOKIE);
    state.auth.logout(token.as_deref(), &meta).await;

    let mut response = Json(MessageResponse::new("Logged out successfully")).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, state.cookies.clear_access_cookie()?);
    response
        .headers_mut()
        .append(header::SET_COOKIE, state.cookies.clear_refresh_cookie()?);
    Ok(response)
}

/// Request a password reset code. The response never reveals whether the
/// address has an account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Constant acknowledgement", body = MessageResponse),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .rate_limiter
        .check(RateScope::ForgotPassword, &meta.ip)
        .await?;

    state.auth.forgot_password(request, &meta).await?;
    Ok(Json(MessageResponse::new(
        "If the email exists, a reset code has been sent.",
    )))
}

/// Trade a reset code for a new password
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset code"),
        (status = 404, description = "Account not found"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .rate_limiter
        .check(RateScope::ResetPassword, &meta.ip)
        .await?;

    state.auth.reset_password(request, &meta).await?;
    Ok(Json(MessageResponse::new("Password reset successful")))
}

/// The authenticated account's own projection
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(auth: AuthContext) -> Json<UserResponse> {
    Json(UserResponse::from(&auth.user))
}

/// 200 body plus both session cookies
fn session_response(
    cookies: &CookiePolicy,
    message: &str,
    bundle: &SessionBundle,
) -> ApiResult<Response> {
    let body = LoginResponse::session(message, UserResponse::from(&bundle.user));
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies.access_cookie(&bundle.access_token)?);
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies.refresh_cookie(&bundle.refresh_token)?);
    Ok(response)
}

/// Error response with both cookies cleared
fn cleared_failure(cookies: &CookiePolicy, err: ApiError) -> ApiResult<Response> {
    let mut response = err.into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies.clear_access_cookie()?);
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies.clear_refresh_cookie()?);
    Ok(response)
}
