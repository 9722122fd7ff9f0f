//! Account self-service endpoints, all behind the authentication gate

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::cookies::REFRESH_COOKIE;
use crate::auth::models::{
    ChangePasswordRequest, DeviceListResponse, DeviceResponse, MessageResponse, ProfilePayload,
    ProfileResponse, UpdateUserRequest, UserResponse,
};
use crate::error::ApiResult;
use crate::middleware::{cookie_value, AuthContext, ClientMeta};
use crate::server::AppState;

/// The authenticated account
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(auth: AuthContext) -> Json<UserResponse> {
    Json(UserResponse::from(&auth.user))
}

/// Update name and/or email. Changing the email de-verifies the account
/// until the new address is confirmed.
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Email already registered"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    request.validate()?;
    let updated = state.account.update_account(&auth.user, request, &meta).await?;
    Ok(Json(UserResponse::from(&updated)))
}

/// Soft-deactivate the account, revoke the session, clear cookies
#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Account deactivated", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn delete_me(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let refresh_token = cookie_value(&headers, REFRESH_COOKIE);
    state
        .account
        .deactivate(&auth.user, refresh_token.as_deref(), &meta)
        .await?;

    let mut response =
        Json(MessageResponse::new("Account deactivated successfully")).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, state.cookies.clear_access_cookie()?);
    response
        .headers_mut()
        .append(header::SET_COOKIE, state.cookies.clear_refresh_cookie()?);
    Ok(response)
}

/// Trusted devices for this account, fingerprints truncated for display
#[utoipa::path(
    get,
    path = "/api/v1/users/me/devices",
    tag = "users",
    responses(
        (status = 200, description = "Trusted devices", body = DeviceListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<DeviceListResponse>> {
    let devices = state.account.list_devices(&auth.user).await?;
    Ok(Json(DeviceListResponse {
        devices: devices.iter().map(DeviceResponse::from).collect(),
    }))
}

/// Forget a trusted device; its next login will be challenged
#[utoipa::path(
    delete,
    path = "/api/v1/users/me/devices/{device_id}",
    tag = "users",
    params(
        ("device_id" = Uuid, Path, description = "Device to remove")
    ),
    responses(
        (status = 200, description = "Device removed", body = MessageResponse),
        (status = 404, description = "Device not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn remove_device(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .account
        .remove_device(&auth.user, device_id, &meta)
        .await?;
    Ok(Json(MessageResponse::new("Device removed successfully")))
}

/// Change the password; the candidate must clear the reuse history
#[utoipa::path(
    post,
    path = "/api/v1/users/me/change-password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password, weak password, or recent reuse"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .account
        .change_password(&auth.user, request, &meta)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Decrypted profile; an account without one gets an empty object
#[utoipa::path(
    get,
    path = "/api/v1/users/me/profile",
    tag = "users",
    responses(
        (status = 200, description = "Profile fields", body = ProfileResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state.account.get_profile(&auth.user, &meta).await?;
    Ok(Json(profile))
}

/// Create or update the profile; sensitive fields are encrypted at rest
#[utoipa::path(
    put,
    path = "/api/v1/users/me/profile",
    tag = "users",
    request_body = ProfilePayload,
    responses(
        (status = 200, description = "Profile saved", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn save_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    meta: ClientMeta,
    Json(payload): Json<ProfilePayload>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .account
        .save_profile(&auth.user, payload, &meta)
        .await?;
    Ok(Json(MessageResponse::new("Profile saved successfully")))
}
