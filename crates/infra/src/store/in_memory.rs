use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use kb_auth::PasswordHash;
use kb_core::{IdentityId, TenantId};

use super::{
    AuditEntry, AuditSink, Identity, IdentityChanges, IdentityFilter, IdentityPage, IdentityStore, NewIdentity,
    PageRequest, SessionRecord, SessionStore, StoreError, TenantStore, TenantSummary,
};

#[derive(Debug, Clone)]
struct TenantRow {
    name: String,
    is_active: bool,
    is_deleted: bool,
}

#[derive(Debug, Default)]
struct Tables {
    identities: BTreeMap<IdentityId, Identity>,
    next_identity: i64,
    sessions: Vec<SessionRecord>,
    tenants: BTreeMap<TenantId, TenantRow>,
    audit: Vec<(AuditEntry, DateTime<Utc>)>,
    fail_audit: bool,
}

/// In-memory implementation of every storage port, for tests/dev.
///
/// All tables sit behind one lock, so multi-table operations
/// (`reset_credential`, `delete_cascade`) are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    /// Seed a tenant row.
    pub fn add_tenant(&self, id: TenantId, name: impl Into<String>, is_active: bool) {
        if let Ok(mut t) = self.inner.lock() {
            t.tenants.insert(
                id,
                TenantRow {
                    name: name.into(),
                    is_active,
                    is_deleted: false,
                },
            );
        }
    }

    pub fn soft_delete_tenant(&self, id: TenantId) {
        if let Ok(mut t) = self.inner.lock() {
            if let Some(row) = t.tenants.get_mut(&id) {
                row.is_deleted = true;
            }
        }
    }

    pub fn audit_actions(&self) -> Vec<&'static str> {
        match self.inner.lock() {
            Ok(t) => t.audit.iter().map(|(e, _)| e.action).collect(),
            Err(_) => vec![],
        }
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        match self.inner.lock() {
            Ok(t) => t.audit.iter().map(|(e, _)| e.clone()).collect(),
            Err(_) => vec![],
        }
    }

    /// Make every subsequent audit insert fail.
    pub fn fail_audit_writes(&self, fail: bool) {
        if let Ok(mut t) = self.inner.lock() {
            t.fail_audit = fail;
        }
    }

    pub fn session_count(&self, id: IdentityId) -> usize {
        match self.inner.lock() {
            Ok(t) => t.sessions.iter().filter(|s| s.identity_id == id).count(),
            Err(_) => 0,
        }
    }
}

fn live_owner(tables: &Tables, token_key: &str, now: DateTime<Utc>) -> Option<IdentityId> {
    tables
        .sessions
        .iter()
        .find(|s| s.token_key == token_key && s.expires_at > now)
        .map(|s| s.identity_id)
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let t = self.tables()?;
        Ok(t.identities
            .values()
            .find(|i| i.email == email && i.is_active && !i.is_deleted())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let t = self.tables()?;
        Ok(t.identities.values().find(|i| i.email == email).cloned())
    }

    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.tables()?.identities.get(&id).cloned())
    }

    async fn insert(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut t = self.tables()?;
        if t.identities.values().any(|i| i.email == new.email) {
            return Err(StoreError::Conflict(format!("email '{}' already exists", new.email)));
        }
        t.next_identity += 1;
        let identity = Identity {
            id: IdentityId::new(t.next_identity),
            username: new.username,
            email: new.email,
            credential: new.credential,
            full_name: new.full_name,
            role: new.role.as_str().to_string(),
            client_access: new.client_access,
            is_active: new.is_active,
            metadata: JsonValue::Object(Default::default()),
            last_login: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        t.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update(
        &self,
        id: IdentityId,
        changes: &IdentityChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        let mut t = self.tables()?;
        let Some(identity) = t.identities.get_mut(&id).filter(|i| !i.is_deleted()) else {
            return Ok(None);
        };
        if let Some(name) = &changes.full_name {
            identity.full_name = Some(name.clone());
        }
        if let Some(role) = changes.role {
            identity.role = role.as_str().to_string();
        }
        if let Some(access) = &changes.client_access {
            identity.client_access = access.clone();
        }
        if let Some(active) = changes.is_active {
            identity.is_active = active;
        }
        identity.updated_at = now;
        Ok(Some(identity.clone()))
    }

    async fn set_credential(
        &self,
        id: IdentityId,
        credential: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        Ok(match t.identities.get_mut(&id) {
            Some(identity) => {
                identity.credential = credential.clone();
                identity.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn set_metadata(
        &self,
        id: IdentityId,
        key: &str,
        value: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        let Some(identity) = t.identities.get_mut(&id) else {
            return Ok(false);
        };
        if !identity.metadata.is_object() {
            identity.metadata = JsonValue::Object(Default::default());
        }
        if let Some(map) = identity.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        identity.updated_at = now;
        Ok(true)
    }

    async fn record_login(&self, id: IdentityId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if let Some(identity) = t.identities.get_mut(&id) {
            identity.last_login = Some(at);
        }
        Ok(())
    }

    async fn delete_cascade(&self, id: IdentityId) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        if t.identities.remove(&id).is_none() {
            return Ok(false);
        }
        t.sessions.retain(|s| s.identity_id != id);
        t.audit.retain(|(e, _)| e.actor != Some(id));
        Ok(true)
    }

    async fn list(&self, filter: &IdentityFilter, page: PageRequest) -> Result<IdentityPage, StoreError> {
        let t = self.tables()?;
        let mut matching: Vec<&Identity> = t.identities.values().filter(|i| filter.matches(i)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(IdentityPage {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn insert_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.sessions.iter().any(|s| s.token_key == record.token_key) {
            return Err(StoreError::Conflict("session token already exists".into()));
        }
        t.sessions.push(record);
        Ok(())
    }

    async fn find_live(&self, token_key: &str, now: DateTime<Utc>) -> Result<Option<IdentityId>, StoreError> {
        let t = self.tables()?;
        Ok(live_owner(&t, token_key, now))
    }

    async fn delete_for_identity(&self, id: IdentityId) -> Result<u64, StoreError> {
        let mut t = self.tables()?;
        let before = t.sessions.len();
        t.sessions.retain(|s| s.identity_id != id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn reset_credential(
        &self,
        token_key: &str,
        now: DateTime<Utc>,
        credential: &PasswordHash,
    ) -> Result<Option<IdentityId>, StoreError> {
        let mut t = self.tables()?;
        let Some(owner) = live_owner(&t, token_key, now) else {
            return Ok(None);
        };
        let Some(identity) = t.identities.get_mut(&owner) else {
            return Ok(None);
        };
        identity.credential = credential.clone();
        identity.updated_at = now;
        t.sessions.retain(|s| s.identity_id != owner);
        Ok(Some(owner))
    }
}

#[async_trait]
impl TenantStore for InMemoryStore {
    async fn active_tenants(&self) -> Result<Vec<TenantSummary>, StoreError> {
        let t = self.tables()?;
        Ok(sorted_active(&t, |_| true))
    }

    async fn active_tenants_in(&self, ids: &[TenantId]) -> Result<Vec<TenantSummary>, StoreError> {
        let t = self.tables()?;
        Ok(sorted_active(&t, |id| ids.contains(&id)))
    }
}

fn sorted_active(tables: &Tables, include: impl Fn(TenantId) -> bool) -> Vec<TenantSummary> {
    let mut out: Vec<TenantSummary> = tables
        .tenants
        .iter()
        .filter(|(id, row)| row.is_active && !row.is_deleted && include(**id))
        .map(|(id, row)| TenantSummary {
            id: *id,
            name: row.name.clone(),
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, entry: AuditEntry, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if t.fail_audit {
            return Err(StoreError::Unavailable("audit_log unavailable".into()));
        }
        t.audit.push((entry, at));
        Ok(())
    }
}
