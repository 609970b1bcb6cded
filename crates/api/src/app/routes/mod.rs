use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};

use kb_auth::{Permission, RequestGate};

use crate::middleware::{self, AuthState, PermissionState};

pub mod auth;
pub mod system;
pub mod users;

/// Endpoints reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/verify-reset-token", get(auth::verify_reset_token))
        .route("/auth/reset-password", post(auth::reset_password))
}

/// Endpoints that need a verified session. The caller wraps this in
/// `auth_middleware`.
pub fn protected_router(gate: Arc<RequestGate>) -> Router {
    let tenant_scoped = Router::new()
        .route("/auth/organisation", put(auth::select_organisation))
        .route("/auth/organisations/:client_id/access", get(system::organisation_access))
        .route_layer(from_fn_with_state(AuthState { gate: gate.clone() }, middleware::tenant_guard));

    let user_admin = users::router().route_layer(from_fn_with_state(
        PermissionState {
            gate,
            permission: Permission::ManageUsers,
        },
        middleware::require_permission,
    ));

    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .merge(tenant_scoped)
        .nest("/users", user_admin)
}
