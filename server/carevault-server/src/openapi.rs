use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::server::AppState;

/// Main OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health endpoints
        crate::handlers::health::health_check,
        crate::handlers::health::version_info,

        // Authentication endpoints
        crate::handlers::auth::register,
        crate::handlers::auth::verify_email,
        crate::handlers::auth::resend_verification,
        crate::handlers::auth::login,
        crate::handlers::auth::verify_device,
        crate::handlers::auth::refresh,
        crate::handlers::auth::logout,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::auth::me,

        // Account self-service endpoints
        crate::handlers::users::get_me,
        crate::handlers::users::update_me,
        crate::handlers::users::delete_me,
        crate::handlers::users::list_devices,
        crate::handlers::users::remove_device,
        crate::handlers::users::change_password,
        crate::handlers::users::get_profile,
        crate::handlers::users::save_profile,
    ),
    components(
        schemas(
            // Health schemas
            crate::handlers::health::HealthResponse,
            crate::handlers::health::VersionResponse,

            // Request schemas
            crate::auth::models::RegisterRequest,
            crate::auth::models::VerifyEmailRequest,
            crate::auth::models::ResendVerificationRequest,
            crate::auth::models::LoginRequest,
            crate::auth::models::VerifyDeviceRequest,
            crate::auth::models::ForgotPasswordRequest,
            crate::auth::models::ResetPasswordRequest,
            crate::auth::models::UpdateUserRequest,
            crate::auth::models::ChangePasswordRequest,
            crate::auth::models::ProfilePayload,

            // Response schemas
            crate::auth::models::UserRole,
            crate::auth::models::UserResponse,
            crate::auth::models::MessageResponse,
            crate::auth::models::LoginResponse,
            crate::auth::models::DeviceResponse,
            crate::auth::models::DeviceListResponse,
            crate::auth::models::ProfileResponse,
            crate::error::ApiErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "System health and status endpoints"),
        (name = "auth", description = "Registration, verification, login, and session management"),
        (name = "users", description = "Account self-service: profile, devices, password"),
    ),
    info(
        title = "CareVault Engine API",
        version = "0.1.0",
        description = "Healthcare records backend: staged registration with email verification, device-trust login, and encrypted patient profiles.",
        contact(
            name = "CareVault Team",
            email = "team@carevault.dev"
        ),
        license(
            name = "AGPL-3.0-only"
        ),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
)]
pub struct ApiDoc;

/// Create API documentation routes
pub fn create_docs_routes() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
