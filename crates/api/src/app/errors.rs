use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use kb_auth::{GateError, GateErrorKind};
use kb_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::InvalidCredentials => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid email or password")
        }
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        DomainError::Persistence(_) | DomainError::Internal(_) => {
            tracing::error!(error = %err, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
        }
    }
}

/// Token details never reach the client; every authentication failure reads the same.
pub fn gate_error_to_response(err: GateError) -> Response {
    match err.kind() {
        GateErrorKind::Unauthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
        }
        GateErrorKind::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
        GateErrorKind::BadRequest => json_error(StatusCode::BAD_REQUEST, "client_id_required", err.to_string()),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
