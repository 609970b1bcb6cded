//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the identity services
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: error kind to status mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        gate: services.gate.clone(),
    };

    let protected = routes::protected_router(services.gate.clone()).layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use chrono::Utc;
    use kb_auth::{CredentialHasher, Role, SessionClaims};
    use kb_core::{IdentityId, TenantId};
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        let (services, store) = services::AppServices::in_memory(SECRET, CredentialHasher::with_iterations(1_000));
        store.add_tenant(TenantId::new(7), "Acme", true);
        store.add_tenant(TenantId::new(9), "Globex", true);
        build_app(Arc::new(services))
    }

    fn token(role: Role, tenants: Vec<TenantId>) -> String {
        let codec = kb_auth::TokenCodec::new(SECRET.as_bytes());
        let claims = SessionClaims::for_identity(IdentityId::new(1), "alice", role, tenants, Utc::now());
        codec.issue(&claims).unwrap()
    }

    fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = app().oneshot(request(Method::GET, "/health", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_401() {
        let res = app().oneshot(request(Method::GET, "/auth/me", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tenant_in_path_is_checked_against_claims() {
        let t = token(Role::Analyst, vec![TenantId::new(7)]);

        let allowed = app()
            .oneshot(request(Method::GET, "/auth/organisations/7/access", Some(&t), None))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let denied = app()
            .oneshot(request(Method::GET, "/auth/organisations/9/access", Some(&t), None))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_path_tenant_is_400() {
        let t = token(Role::SuperAdmin, vec![]);
        let res = app()
            .oneshot(request(Method::GET, "/auth/organisations/acme/access", Some(&t), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_admin_requires_manage_users() {
        let t = token(Role::Viewer, vec![TenantId::new(7)]);
        let res = app().oneshot(request(Method::GET, "/users", Some(&t), None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn select_organisation_without_client_id_is_400() {
        let t = token(Role::Analyst, vec![TenantId::new(7)]);
        let res = app()
            .oneshot(request(Method::PUT, "/auth/organisation", Some(&t), Some(serde_json::json!({}))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
