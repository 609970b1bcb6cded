use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, RawPathParams, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};

use kb_auth::{CLIENT_ID_FIELD, Permission, RequestGate, TenantSources, resolve_tenant_id};

use crate::app::errors;
use crate::context::{CallerContext, TenantContext};

/// Largest JSON body the tenant guard will buffer.
const MAX_GUARDED_BODY: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<RequestGate>,
}

/// Verify the bearer token and attach the caller to the request.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let claims = match state.gate.authenticate(authorization(req.headers())) {
        Ok(claims) => claims,
        Err(err) => return errors::gate_error_to_response(err),
    };

    req.extensions_mut().insert(CallerContext::new(claims));
    next.run(req).await
}

#[derive(Clone)]
pub struct PermissionState {
    pub gate: Arc<RequestGate>,
    pub permission: Permission,
}

/// Require one permission. Must run inside `auth_middleware`.
pub async fn require_permission(State(state): State<PermissionState>, req: Request, next: Next) -> Response {
    let Some(caller) = req.extensions().get::<CallerContext>() else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required");
    };
    if let Err(err) = state.gate.authorize(caller.claims(), state.permission) {
        return errors::gate_error_to_response(err);
    }
    next.run(req).await
}

/// Resolve the target tenant (path, then query, then JSON body `client_id`),
/// check the caller's access to it and attach a [`TenantContext`].
///
/// Must run inside `auth_middleware`, as a route layer so path params exist.
pub async fn tenant_guard(
    State(state): State<AuthState>,
    path_params: RawPathParams,
    Query(query): Query<HashMap<String, String>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(caller) = req.extensions().get::<CallerContext>().cloned() else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required");
    };

    let path_value = path_params
        .iter()
        .find(|(name, _)| *name == CLIENT_ID_FIELD)
        .map(|(_, value)| value.to_string());

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_GUARDED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return errors::json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", "request body too large");
        }
    };
    let json_body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice::<serde_json::Value>(&bytes).ok()
    };

    let sources = TenantSources {
        path: path_value.as_deref(),
        query: query.get(CLIENT_ID_FIELD).map(String::as_str),
        body: json_body.as_ref(),
    };
    let tenant_id = match resolve_tenant_id(&sources, CLIENT_ID_FIELD) {
        Ok(id) => id,
        Err(err) => return errors::gate_error_to_response(err),
    };
    if let Err(err) = state.gate.authorize_tenant(caller.claims(), tenant_id) {
        return errors::gate_error_to_response(err);
    }

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(TenantContext::new(tenant_id));
    next.run(req).await
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}
