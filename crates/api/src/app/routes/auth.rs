use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::{CallerContext, TenantContext};

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    match services.auth.login(&body.email, &body.password).await {
        Ok(result) => (StatusCode::OK, Json(dto::LoginResponse::from(result))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Always answers the same way for known emails; unknown ones are a 404.
pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ForgotPasswordRequest>,
) -> axum::response::Response {
    match services.auth.forgot_password(&body.email).await {
        Ok(()) => (
            StatusCode::OK,
            Json(dto::SuccessResponse::ok("Password reset link has been sent to your email.")),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn verify_reset_token(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::VerifyResetTokenQuery>,
) -> axum::response::Response {
    match services.auth.verify_reset_token(&query.token).await {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({ "valid": true, "message": "Token is valid" })),
        )
            .into_response(),
        Ok(false) => errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "token is invalid or expired"),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ResetPasswordRequest>,
) -> axum::response::Response {
    match services
        .auth
        .reset_password(&body.token, &body.password, &body.confirm_password)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok("Password has been reset."))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.auth.profile(caller.identity_id()).await {
        Ok(profile) => (StatusCode::OK, Json(dto::ProfileResponse::from(profile))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.auth.logout(caller.identity_id()).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok("Logged out successfully"))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Persist the caller's selected organisation. The tenant guard has already
/// checked access to `client_id`.
pub async fn select_organisation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.auth.select_tenant(caller.claims(), tenant.tenant_id()).await {
        Ok(selected) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "lastSelectedOrgId": selected.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
