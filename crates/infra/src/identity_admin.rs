//! Administrative identity management (callers hold `manage_users`).

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use kb_auth::{CredentialHasher, Role};
use kb_core::{DomainError, DomainResult, IdentityId, TenantId};

use crate::audit::{AuditRecorder, actions};
use crate::auth_flow::{check_password_policy, normalize_email};
use crate::store::{
    AuditEntry, Identity, IdentityChanges, IdentityFilter, IdentityPage, IdentityStore, NewIdentity, PageRequest,
    StorePorts,
};

#[derive(Debug, Clone)]
pub struct CreateIdentity {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub client_access: Vec<TenantId>,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct IdentityAdmin {
    identities: Arc<dyn IdentityStore>,
    audit: AuditRecorder,
    hasher: CredentialHasher,
}

impl IdentityAdmin {
    pub fn new(ports: &StorePorts, hasher: CredentialHasher) -> Self {
        Self {
            identities: ports.identities.clone(),
            audit: AuditRecorder::new(ports.audit.clone()),
            hasher,
        }
    }

    pub async fn create(&self, actor: IdentityId, req: CreateIdentity) -> DomainResult<Identity> {
        let email = normalize_email(&req.email);
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("a valid email is required"));
        }
        let username = req.username.trim();
        if username.is_empty() {
            return Err(DomainError::validation("username is required"));
        }
        check_password_policy(&req.password)?;

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict("email already registered"));
        }

        let created = self
            .identities
            .insert(NewIdentity {
                username: username.to_string(),
                email,
                credential: self.hasher.hash(&req.password, None),
                full_name: req.full_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                role: req.role,
                client_access: req.client_access,
                is_active: req.is_active,
                created_at: Utc::now(),
            })
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(actor), actions::CREATE_USER)
                    .resource("user", created.id)
                    .details(json!({ "email": created.email, "role": created.role })),
            )
            .await;
        tracing::info!(actor = %actor, user_id = %created.id, role = %created.role, "identity created");
        Ok(created)
    }

    pub async fn get(&self, id: IdentityId) -> DomainResult<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .filter(|i| !i.is_deleted())
            .ok_or(DomainError::NotFound("user"))
    }

    /// Never includes the caller or soft-deleted identities.
    pub async fn list(&self, actor: IdentityId, filter: IdentityFilter, page: PageRequest) -> DomainResult<IdentityPage> {
        let filter = IdentityFilter {
            exclude: Some(actor),
            ..filter
        };
        Ok(self.identities.list(&filter, page).await?)
    }

    pub async fn update(&self, actor: IdentityId, id: IdentityId, changes: IdentityChanges) -> DomainResult<Identity> {
        if changes.is_empty() {
            return self.get(id).await;
        }
        let updated = self
            .identities
            .update(id, &changes, Utc::now())
            .await?
            .ok_or(DomainError::NotFound("user"))?;

        let details = json!({
            "full_name": changes.full_name,
            "role": changes.role,
            "organisation_ids": changes.client_access,
            "is_active": changes.is_active,
        });
        self.audit
            .record(
                AuditEntry::new(Some(actor), actions::UPDATE_USER)
                    .resource("user", id)
                    .details(details),
            )
            .await;
        Ok(updated)
    }

    /// Hard delete. Self-deletion and deleting a super-admin are refused.
    pub async fn delete(&self, actor: IdentityId, id: IdentityId) -> DomainResult<()> {
        if actor == id {
            return Err(DomainError::validation("you cannot delete your own account"));
        }
        let target = self.get(id).await?;
        if target.role.parse::<Role>().is_ok_and(Role::is_super_admin) {
            return Err(DomainError::validation("super admin accounts cannot be deleted"));
        }

        if !self.identities.delete_cascade(id).await? {
            return Err(DomainError::NotFound("user"));
        }

        self.audit
            .record(
                AuditEntry::new(Some(actor), actions::DELETE_USER)
                    .resource("user", id)
                    .details(json!({ "email": target.email })),
            )
            .await;
        tracing::info!(actor = %actor, user_id = %id, "identity deleted");
        Ok(())
    }

    /// Create or replace the bootstrap super-admin.
    pub async fn seed_admin(&self, email: &str, password: &str) -> DomainResult<Identity> {
        let email = normalize_email(email);
        check_password_policy(password)?;
        let credential = self.hasher.hash(password, None);

        let Some(existing) = self.identities.find_by_email(&email).await? else {
            let username = email.split('@').next().unwrap_or("admin").to_string();
            let created = self
                .identities
                .insert(NewIdentity {
                    username,
                    email,
                    credential,
                    full_name: Some("Administrator".to_string()),
                    role: Role::SuperAdmin,
                    client_access: vec![],
                    is_active: true,
                    created_at: Utc::now(),
                })
                .await?;
            tracing::info!(user_id = %created.id, "seeded super admin");
            return Ok(created);
        };

        let now = Utc::now();
        self.identities.set_credential(existing.id, &credential, now).await?;
        let changes = IdentityChanges {
            role: Some(Role::SuperAdmin),
            is_active: Some(true),
            ..Default::default()
        };
        let updated = self
            .identities
            .update(existing.id, &changes, now)
            .await?
            .ok_or(DomainError::NotFound("user"))?;
        tracing::info!(user_id = %updated.id, "reset existing super admin");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    struct Harness {
        store: Arc<InMemoryStore>,
        admin: IdentityAdmin,
        root: IdentityId,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let admin = IdentityAdmin::new(&StorePorts::in_memory(store.clone()), CredentialHasher::with_iterations(1_000));
        let root = admin.seed_admin("Root@Example.com", "root-password").await.unwrap().id;
        Harness { store, admin, root }
    }

    fn request(email: &str, role: Role, access: &[i64]) -> CreateIdentity {
        CreateIdentity {
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            password: "initial-pass".to_string(),
            full_name: Some(format!("User {email}")),
            role,
            client_access: access.iter().copied().map(TenantId::new).collect(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_lowercases_and_rejects_duplicates() {
        let h = harness().await;
        let created = h.admin.create(h.root, request("New@Example.com", Role::Analyst, &[7])).await.unwrap();
        assert_eq!(created.email, "new@example.com");
        assert_eq!(created.role, "analyst");

        let dup = h.admin.create(h.root, request("NEW@example.com", Role::Viewer, &[])).await.unwrap_err();
        assert!(matches!(dup, DomainError::Conflict(_)));
        assert!(h.store.audit_actions().contains(&actions::CREATE_USER));
    }

    #[tokio::test]
    async fn create_validates_input() {
        let h = harness().await;
        let mut bad = request("x@example.com", Role::Viewer, &[]);
        bad.password = "short".into();
        assert!(matches!(h.admin.create(h.root, bad).await, Err(DomainError::Validation(_))));

        let no_at = request("not-an-email", Role::Viewer, &[]);
        assert!(matches!(h.admin.create(h.root, no_at).await, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn list_excludes_caller_and_filters() {
        let h = harness().await;
        h.admin.create(h.root, request("a@example.com", Role::Analyst, &[7])).await.unwrap();
        h.admin.create(h.root, request("b@example.com", Role::Viewer, &[9])).await.unwrap();
        h.admin.create(h.root, request("c@example.com", Role::Viewer, &[7, 9])).await.unwrap();

        let all = h.admin.list(h.root, IdentityFilter::default(), PageRequest::default()).await.unwrap();
        assert_eq!(all.total, 3);
        assert!(all.items.iter().all(|i| i.id != h.root));

        let viewers_in_7 = h
            .admin
            .list(
                h.root,
                IdentityFilter {
                    role: Some(Role::Viewer),
                    tenant: Some(TenantId::new(7)),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(viewers_in_7.items.len(), 1);
        assert_eq!(viewers_in_7.items[0].email, "c@example.com");

        let paged = h.admin.list(h.root, IdentityFilter::default(), PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages(), 2);
    }

    #[tokio::test]
    async fn update_changes_fields_and_audits() {
        let h = harness().await;
        let id = h.admin.create(h.root, request("u@example.com", Role::Viewer, &[])).await.unwrap().id;

        let updated = h
            .admin
            .update(
                h.root,
                id,
                IdentityChanges {
                    role: Some(Role::ClientAdmin),
                    client_access: Some(vec![TenantId::new(5)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, "client_admin");
        assert_eq!(updated.client_access, vec![TenantId::new(5)]);
        assert!(h.store.audit_actions().contains(&actions::UPDATE_USER));

        let missing = h
            .admin
            .update(h.root, IdentityId::new(999), IdentityChanges { is_active: Some(false), ..Default::default() })
            .await;
        assert_eq!(missing, Err(DomainError::NotFound("user")));
    }

    #[tokio::test]
    async fn delete_rules() {
        let h = harness().await;
        assert!(matches!(h.admin.delete(h.root, h.root).await, Err(DomainError::Validation(_))));

        let other_root = h.admin.create(h.root, request("r2@example.com", Role::SuperAdmin, &[])).await.unwrap().id;
        assert!(matches!(h.admin.delete(h.root, other_root).await, Err(DomainError::Validation(_))));

        let victim = h.admin.create(h.root, request("v@example.com", Role::Viewer, &[])).await.unwrap().id;
        h.admin.delete(h.root, victim).await.unwrap();
        assert_eq!(h.admin.get(victim).await, Err(DomainError::NotFound("user")));
        assert_eq!(h.admin.delete(h.root, victim).await, Err(DomainError::NotFound("user")));
        assert!(h.store.audit_actions().contains(&actions::DELETE_USER));
    }

    #[tokio::test]
    async fn seeding_twice_replaces_the_password() {
        let h = harness().await;
        let again = h.admin.seed_admin("root@example.com", "rotated-password").await.unwrap();
        assert_eq!(again.id, h.root);
        assert_eq!(again.role, "super_admin");

        let hasher = CredentialHasher::with_iterations(1_000);
        assert!(hasher.verify("rotated-password", &again.credential.hash, &again.credential.salt));
    }
}
