use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kb_auth::Role;
use kb_core::TenantId;
use kb_infra::{Identity, IdentityPage, LoginResult, Profile, TenantSummary};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetTokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub full_name: Option<String>,
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub organisation_ids: Vec<TenantId>,
    #[serde(default = "default_status")]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub organisation_ids: Option<Vec<TenantId>>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub organisation_id: Option<TenantId>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn default_role() -> String {
    Role::Viewer.as_str().to_string()
}

fn default_status() -> String {
    STATUS_ENABLED.to_string()
}

pub const STATUS_ENABLED: &str = "enabled";
pub const STATUS_DISABLED: &str = "disabled";

/// `enabled` / `disabled` to the active flag.
pub fn parse_status(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        STATUS_ENABLED | "active" => Some(true),
        STATUS_DISABLED | "inactive" => Some(false),
        _ => None,
    }
}

fn status_of(active: bool) -> &'static str {
    if active { STATUS_ENABLED } else { STATUS_DISABLED }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrganisationDto {
    pub id: String,
    pub name: String,
}

impl From<&TenantSummary> for OrganisationDto {
    fn from(t: &TenantSummary) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub organisation: Option<String>,
    pub organisations: Vec<OrganisationDto>,
    pub last_selected_org_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUserDto,
}

impl From<LoginResult> for LoginResponse {
    fn from(r: LoginResult) -> Self {
        let selected = r.selected_tenant.map(|id| id.to_string());
        let organisation = r
            .selected_tenant
            .and_then(|id| r.tenants.iter().find(|t| t.id == id))
            .map(|t| t.name.clone());
        Self {
            token: r.token,
            user: SessionUserDto {
                id: r.identity_id.to_string(),
                name: r.display_name,
                email: r.email,
                role: r.role.as_str().to_string(),
                organisation,
                organisations: r.tenants.iter().map(OrganisationDto::from).collect(),
                last_selected_org_id: selected,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub organisations: Vec<OrganisationDto>,
    pub last_selected_org_id: Option<String>,
    pub last_login_date: Option<DateTime<Utc>>,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id.to_string(),
            username: p.username,
            name: p.display_name,
            email: p.email,
            role: p.role,
            organisations: p.organisations.iter().map(OrganisationDto::from).collect(),
            last_selected_org_id: p.selected_tenant.map(|t| t.to_string()),
            last_login_date: p.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub organisation_ids: Vec<TenantId>,
    pub status: &'static str,
    pub last_login_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for UserResponse {
    fn from(i: &Identity) -> Self {
        Self {
            id: i.id.to_string(),
            full_name: i.display_name().to_string(),
            username: i.username.clone(),
            email: i.email.clone(),
            role: i.role.clone(),
            organisation_ids: i.client_access.clone(),
            status: status_of(i.is_active),
            last_login_date: i.last_login,
            created_at: i.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub data: Vec<UserResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl From<IdentityPage> for UserListResponse {
    fn from(p: IdentityPage) -> Self {
        Self {
            total_pages: p.total_pages(),
            data: p.items.iter().map(UserResponse::from).collect(),
            total: p.total,
            page: p.page,
            limit: p.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_words() {
        assert_eq!(parse_status("Enabled"), Some(true));
        assert_eq!(parse_status("disabled"), Some(false));
        assert_eq!(parse_status("maybe"), None);
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "email": "a@example.com",
            "username": "a",
            "password": "long-enough",
        }))
        .unwrap();
        assert_eq!(req.role, "viewer");
        assert_eq!(req.status, "enabled");
        assert!(req.organisation_ids.is_empty());
    }

    #[test]
    fn reset_request_uses_camel_case() {
        let req: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "token": "t",
            "password": "p",
            "confirmPassword": "p",
        }))
        .unwrap();
        assert_eq!(req.confirm_password, "p");
    }
}
