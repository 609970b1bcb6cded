use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::{CallerContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Tenant access probe: reaching this handler means the caller may act on the
/// tenant named in the path.
pub async fn organisation_access(
    Extension(caller): Extension<CallerContext>,
    Extension(tenant): Extension<TenantContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "client_id": tenant.tenant_id(),
        "user_id": caller.identity_id(),
        "role": caller.role(),
        "access": true,
    }))
}
