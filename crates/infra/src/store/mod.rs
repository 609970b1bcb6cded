//! Storage ports for identities, sessions, tenants and audit rows.
//!
//! Services depend only on these traits. Two adapters exist: an in-memory
//! store for tests/dev and a Postgres store for production.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use kb_auth::{PasswordHash, Role};
use kb_core::{DomainError, IdentityId, TenantId};

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

/// Metadata key marking an identity as soft-deleted.
pub const META_IS_DELETED: &str = "is_deleted";

/// Metadata key holding the identity's preferred tenant.
pub const META_LAST_SELECTED_ORG: &str = "last_selected_org_id";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint violated (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A row could not be decoded into the domain shape.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            other => DomainError::Persistence(other.to_string()),
        }
    }
}

/// A stored identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    /// Always lower-cased.
    pub email: String,
    pub credential: PasswordHash,
    pub full_name: Option<String>,
    /// Role wire name as stored; may be unknown to this build.
    pub role: String,
    pub client_access: Vec<TenantId>,
    pub is_active: bool,
    pub metadata: JsonValue,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn is_deleted(&self) -> bool {
        self.metadata
            .get(META_IS_DELETED)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    /// Full name when set, else username.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }

    /// The stored tenant preference, if it is a usable tenant id.
    pub fn last_selected_tenant(&self) -> Option<TenantId> {
        match self.metadata.get(META_LAST_SELECTED_ORG)? {
            JsonValue::Number(n) => n.as_i64().map(TenantId::new),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Insert payload. `email` must already be lower-cased.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub credential: PasswordHash,
    pub full_name: Option<String>,
    pub role: Role,
    pub client_access: Vec<TenantId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityChanges {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub client_access: Option<Vec<TenantId>>,
    pub is_active: Option<bool>,
}

impl IdentityChanges {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.role.is_none() && self.client_access.is_none() && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityFilter {
    /// Case-insensitive substring over full name, email and username.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub tenant: Option<TenantId>,
    pub exclude: Option<IdentityId>,
}

impl IdentityFilter {
    pub fn matches(&self, identity: &Identity) -> bool {
        if identity.is_deleted() || self.exclude == Some(identity.id) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::to_lowercase) {
            let hit = [
                identity.full_name.as_deref().unwrap_or(""),
                identity.email.as_str(),
                identity.username.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.role.is_some_and(|role| role.as_str() != identity.role) {
            return false;
        }
        if self.is_active.is_some_and(|active| active != identity.is_active) {
            return false;
        }
        if self.tenant.is_some_and(|t| !identity.client_access.contains(&t)) {
            return false;
        }
        true
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp to `page >= 1` and `1 <= limit <= MAX_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityPage {
    pub items: Vec<Identity>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl IdentityPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }
}

/// A persisted session row. Reset tokens are stored with the `reset_` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub identity_id: IdentityId,
    pub token_key: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSummary {
    pub id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor: Option<IdentityId>,
    pub action: &'static str,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub details: Option<JsonValue>,
}

impl AuditEntry {
    pub fn new(actor: Option<IdentityId>, action: &'static str) -> Self {
        Self {
            actor,
            action,
            resource_type: None,
            resource_id: None,
            tenant_id: None,
            details: None,
        }
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl ToString) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Active, non-deleted identity by lower-cased email.
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Any identity by lower-cased email, regardless of state.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;

    /// Fails with `Conflict` when the email is taken.
    async fn insert(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    /// Returns `None` when no non-deleted identity has this id.
    async fn update(
        &self,
        id: IdentityId,
        changes: &IdentityChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError>;

    async fn set_credential(
        &self,
        id: IdentityId,
        credential: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Merge one key into the identity's metadata object.
    async fn set_metadata(
        &self,
        id: IdentityId,
        key: &str,
        value: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn record_login(&self, id: IdentityId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Hard delete with the identity's session and audit rows, atomically.
    async fn delete_cascade(&self, id: IdentityId) -> Result<bool, StoreError>;

    async fn list(&self, filter: &IdentityFilter, page: PageRequest) -> Result<IdentityPage, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Owner of `token_key` if the row exists and `expires_at > now`.
    async fn find_live(&self, token_key: &str, now: DateTime<Utc>) -> Result<Option<IdentityId>, StoreError>;

    async fn delete_for_identity(&self, id: IdentityId) -> Result<u64, StoreError>;

    /// Re-check `token_key`, replace the owner's credential and delete every
    /// session row of the owner, as one atomic step. `None` when the token is
    /// unknown or expired; nothing is changed then.
    async fn reset_credential(
        &self,
        token_key: &str,
        now: DateTime<Utc>,
        credential: &PasswordHash,
    ) -> Result<Option<IdentityId>, StoreError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Every active, non-deleted tenant, ordered by name.
    async fn active_tenants(&self) -> Result<Vec<TenantSummary>, StoreError>;

    /// Active, non-deleted tenants among `ids`, ordered by name.
    async fn active_tenants_in(&self, ids: &[TenantId]) -> Result<Vec<TenantSummary>, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// The full set of storage ports, wired once at startup.
#[derive(Clone)]
pub struct StorePorts {
    pub identities: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl StorePorts {
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            identities: store.clone(),
            sessions: store.clone(),
            tenants: store.clone(),
            audit: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            identities: store.clone(),
            sessions: store.clone(),
            tenants: store.clone(),
            audit: store,
        }
    }
}
