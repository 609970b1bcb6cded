use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use kb_auth::Role;
use kb_core::{DomainError, IdentityId};
use kb_infra::{CreateIdentity, IdentityChanges, IdentityFilter, PageRequest};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<dto::ListUsersQuery>,
) -> axum::response::Response {
    let filter = match list_filter(&query) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));

    match services.admin.list(caller.identity_id(), filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::UserListResponse::from(page))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    let req = match create_request(body) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.admin.create(caller.identity_id(), req).await {
        Ok(identity) => (StatusCode::CREATED, Json(dto::UserResponse::from(&identity))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match IdentityId::from_str(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.admin.get(id).await {
        Ok(identity) => (StatusCode::OK, Json(dto::UserResponse::from(&identity))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateUserRequest>,
) -> axum::response::Response {
    let id = match IdentityId::from_str(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let changes = match update_changes(body) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.admin.update(caller.identity_id(), id, changes).await {
        Ok(identity) => (StatusCode::OK, Json(dto::UserResponse::from(&identity))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match IdentityId::from_str(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.admin.delete(caller.identity_id(), id).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok("User deleted successfully"))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

fn parse_role(raw: &str) -> Result<Role, DomainError> {
    Role::parse_lenient(raw).map_err(|_| DomainError::validation(format!("unknown role: {raw}")))
}

fn parse_status(raw: &str) -> Result<bool, DomainError> {
    dto::parse_status(raw).ok_or_else(|| DomainError::validation(format!("unknown status: {raw}")))
}

fn list_filter(query: &dto::ListUsersQuery) -> Result<IdentityFilter, DomainError> {
    Ok(IdentityFilter {
        search: query.search.clone().filter(|s| !s.trim().is_empty()),
        role: query.role.as_deref().map(parse_role).transpose()?,
        is_active: query.status.as_deref().map(parse_status).transpose()?,
        tenant: query.organisation_id,
        exclude: None,
    })
}

fn create_request(body: dto::CreateUserRequest) -> Result<CreateIdentity, DomainError> {
    Ok(CreateIdentity {
        role: parse_role(&body.role)?,
        is_active: parse_status(&body.status)?,
        username: body.username,
        email: body.email,
        password: body.password,
        full_name: body.full_name,
        client_access: body.organisation_ids,
    })
}

fn update_changes(body: dto::UpdateUserRequest) -> Result<IdentityChanges, DomainError> {
    Ok(IdentityChanges {
        full_name: body.full_name,
        role: body.role.as_deref().map(parse_role).transpose()?,
        client_access: body.organisation_ids,
        is_active: body.status.as_deref().map(parse_status).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_in_filter_is_rejected() {
        let query = dto::ListUsersQuery {
            role: Some("overlord".into()),
            ..Default::default()
        };
        assert!(matches!(list_filter(&query), Err(DomainError::Validation(_))));
    }

    #[test]
    fn admin_role_input_ignores_case() {
        assert_eq!(parse_role(" Client_Admin ").unwrap(), Role::ClientAdmin);
    }

    #[test]
    fn blank_search_is_dropped() {
        let query = dto::ListUsersQuery {
            search: Some("  ".into()),
            status: Some("disabled".into()),
            ..Default::default()
        };
        let filter = list_filter(&query).unwrap();
        assert!(filter.search.is_none());
        assert_eq!(filter.is_active, Some(false));
    }

    #[test]
    fn update_maps_only_present_fields() {
        let changes = update_changes(dto::UpdateUserRequest {
            role: Some("analyst".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.role, Some(Role::Analyst));
        assert!(changes.full_name.is_none());
        assert!(changes.client_access.is_none());
        assert!(changes.is_active.is_none());
    }
}
