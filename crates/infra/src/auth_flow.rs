//! Login, password reset, logout and tenant selection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use kb_auth::{AccessEvaluator, CredentialHasher, Role, SessionClaims, TokenCodec};
use kb_core::{DomainError, DomainResult, IdentityId, TenantId};

use crate::audit::{AuditRecorder, actions};
use crate::notify::ResetNotifier;
use crate::sessions::SessionService;
use crate::store::{
    AuditEntry, Identity, IdentityStore, META_LAST_SELECTED_ORG, StorePorts, TenantStore, TenantSummary,
};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Well-formed hex salt used to burn the same PBKDF2 work for unknown emails.
const DUMMY_SALT: &str = "00000000000000000000000000000000000000000000000000000000000000ff";

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResult {
    pub token: String,
    pub identity_id: IdentityId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub tenants: Vec<TenantSummary>,
    pub selected_tenant: Option<TenantId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: IdentityId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub organisations: Vec<TenantSummary>,
    pub selected_tenant: Option<TenantId>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    tenants: Arc<dyn TenantStore>,
    sessions: SessionService,
    audit: AuditRecorder,
    notifier: Arc<dyn ResetNotifier>,
    codec: TokenCodec,
    evaluator: AccessEvaluator,
    hasher: CredentialHasher,
}

impl AuthService {
    pub fn new(
        ports: &StorePorts,
        codec: TokenCodec,
        evaluator: AccessEvaluator,
        hasher: CredentialHasher,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        Self {
            identities: ports.identities.clone(),
            tenants: ports.tenants.clone(),
            sessions: SessionService::new(ports.sessions.clone(), hasher),
            audit: AuditRecorder::new(ports.audit.clone()),
            notifier,
            codec,
            evaluator,
            hasher,
        }
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub async fn login(&self, email: &str, password: &str) -> DomainResult<LoginResult> {
        self.login_at(email, password, Utc::now()).await
    }

    /// Every rejection (unknown, inactive or deleted identity, wrong password,
    /// unusable stored role) is the same `InvalidCredentials`.
    pub async fn login_at(&self, email: &str, password: &str, now: DateTime<Utc>) -> DomainResult<LoginResult> {
        let email = normalize_email(email);

        let Some(identity) = self.identities.find_active_by_email(&email).await? else {
            let _ = self.hasher.verify(password, "", DUMMY_SALT);
            tracing::info!("login rejected");
            return Err(DomainError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify(password, &identity.credential.hash, &identity.credential.salt)
        {
            tracing::info!(user_id = %identity.id, "login rejected");
            return Err(DomainError::InvalidCredentials);
        }

        let Ok(role) = identity.role.parse::<Role>() else {
            tracing::warn!(user_id = %identity.id, role = %identity.role, "stored role is not recognised");
            return Err(DomainError::InvalidCredentials);
        };

        let tenants = self.visible_tenants(&identity, role).await;
        let selected_tenant = identity
            .last_selected_tenant()
            .or_else(|| tenants.first().map(|t| t.id));

        let claims = SessionClaims::for_identity(
            identity.id,
            identity.username.clone(),
            role,
            identity.client_access.clone(),
            now,
        );
        let token = self
            .codec
            .issue_at(&claims, now)
            .map_err(|e| DomainError::internal(e.to_string()))?;

        if let Err(err) = self.identities.record_login(identity.id, now).await {
            tracing::warn!(user_id = %identity.id, error = %err, "failed to stamp last_login");
        }
        self.audit
            .record(AuditEntry::new(Some(identity.id), actions::USER_LOGIN).resource("user", identity.id))
            .await;

        tracing::info!(user_id = %identity.id, %role, tenants = tenants.len(), "login succeeded");
        Ok(LoginResult {
            token,
            identity_id: identity.id,
            display_name: identity.display_name().to_string(),
            email: identity.email,
            role,
            tenants,
            selected_tenant,
        })
    }

    /// Super-admins see every active tenant, everyone else the active subset
    /// of their stored list. Listing failures degrade to an empty list.
    async fn visible_tenants(&self, identity: &Identity, role: Role) -> Vec<TenantSummary> {
        let listed = if role.is_super_admin() {
            self.tenants.active_tenants().await
        } else {
            self.tenants.active_tenants_in(&identity.client_access).await
        };
        listed.unwrap_or_else(|err| {
            tracing::warn!(user_id = %identity.id, error = %err, "tenant listing failed");
            Vec::new()
        })
    }

    /// Start a reset for an active identity. Unknown emails are `NotFound`.
    pub async fn forgot_password(&self, email: &str) -> DomainResult<()> {
        let email = normalize_email(email);
        let identity = self
            .identities
            .find_active_by_email(&email)
            .await?
            .ok_or(DomainError::NotFound("user"))?;

        let token = self.sessions.create_reset_token(identity.id).await?;

        let display_name = identity.full_name.as_deref().unwrap_or("User");
        if let Err(err) = self.notifier.send_reset(&identity.email, &token, display_name).await {
            tracing::warn!(user_id = %identity.id, error = %err, "reset notification failed");
        }

        self.audit
            .record(
                AuditEntry::new(Some(identity.id), actions::PASSWORD_RESET_REQUESTED)
                    .resource("user", identity.id)
                    .details(json!({ "email": identity.email })),
            )
            .await;
        Ok(())
    }

    pub async fn verify_reset_token(&self, token: &str) -> DomainResult<bool> {
        Ok(self.sessions.validate_reset_token(token).await?.is_some())
    }

    pub async fn reset_password(&self, token: &str, password: &str, confirm: &str) -> DomainResult<()> {
        check_new_password(password, confirm)?;

        let owner = self
            .sessions
            .consume_and_reset_password(token, password)
            .await?
            .ok_or_else(|| DomainError::validation("invalid or expired reset token"))?;

        self.audit
            .record(AuditEntry::new(Some(owner), actions::PASSWORD_RESET_COMPLETED).resource("user", owner))
            .await;
        Ok(())
    }

    pub async fn logout(&self, identity_id: IdentityId) -> DomainResult<()> {
        self.sessions.delete_all_sessions(identity_id).await?;
        self.audit
            .record(AuditEntry::new(Some(identity_id), actions::USER_LOGOUT).resource("user", identity_id))
            .await;
        tracing::info!(user_id = %identity_id, "logged out");
        Ok(())
    }

    pub async fn profile(&self, identity_id: IdentityId) -> DomainResult<Profile> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .filter(|i| !i.is_deleted())
            .ok_or(DomainError::NotFound("user"))?;

        let organisations = self
            .tenants
            .active_tenants_in(&identity.client_access)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(user_id = %identity.id, error = %err, "tenant listing failed");
                Vec::new()
            });

        Ok(Profile {
            id: identity.id,
            display_name: identity.display_name().to_string(),
            selected_tenant: identity.last_selected_tenant(),
            username: identity.username,
            email: identity.email,
            role: identity.role,
            organisations,
            last_login: identity.last_login,
        })
    }

    /// Persist the caller's preferred tenant after a tenant-scope check.
    pub async fn select_tenant(&self, claims: &SessionClaims, tenant_id: TenantId) -> DomainResult<TenantId> {
        if !self
            .evaluator
            .has_client_access(&claims.tenant_access, tenant_id, &claims.role)
        {
            return Err(DomainError::forbidden(format!("no access to client {tenant_id}")));
        }

        let stored = self
            .identities
            .set_metadata(claims.identity_id, META_LAST_SELECTED_ORG, json!(tenant_id.get()), Utc::now())
            .await?;
        if !stored {
            return Err(DomainError::NotFound("user"));
        }

        self.audit
            .record(
                AuditEntry::new(Some(claims.identity_id), actions::SELECT_ORGANISATION)
                    .resource("client", tenant_id)
                    .tenant(tenant_id),
            )
            .await;
        Ok(tenant_id)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_new_password(password: &str, confirm: &str) -> DomainResult<()> {
    if password != confirm {
        return Err(DomainError::validation("passwords do not match"));
    }
    check_password_policy(password)
}

pub fn check_password_policy(password: &str) -> DomainResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
