//! Route table
//!
//! Health and docs sit at the root; everything else lives under `/api/v1`.
//! The `/users` subtree and `/auth/me` are gated by `require_auth`; the rest
//! of `/auth` is reachable without a session.

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{auth, health, users};
use crate::middleware::require_auth;
use crate::openapi;
use crate::server::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/version", get(health::version_info))
}

/// Authentication routes. `/signup` and `/verify` are aliases kept for
/// older clients.
pub fn auth_routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(auth::register))
        .route("/signup", post(auth::register))
        .route("/verify-email", post(auth::verify_email))
        .route("/verify", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/verify-device", post(auth::verify_device))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    let protected = Router::new()
        .route("/me", get(auth::me))
        .route_layer(from_fn_with_state(state, require_auth));

    public.merge(protected)
}

/// Account self-service routes, all authenticated
pub fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(users::get_me)
                .put(users::update_me)
                .delete(users::delete_me),
        )
        .route("/me/devices", get(users::list_devices))
        .route("/me/devices/:device_id", delete(users::remove_device))
        .route("/me/change-password", post(users::change_password))
        .route(
            "/me/profile",
            get(users::get_profile).put(users::save_profile),
        )
        .route_layer(from_fn_with_state(state, require_auth))
}

pub fn api_v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .nest("/users", user_routes(state))
}

/// Create all application routes
pub fn create_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(health_routes())
        .merge(openapi::create_docs_routes())
        .nest("/api/v1", api_v1_routes(state))
}
