//! Reset-token lifecycle over the session table.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;

use kb_auth::CredentialHasher;
use kb_core::{DomainResult, IdentityId};

use crate::store::{SessionRecord, SessionStore};

/// Stored-key namespace for reset tokens.
pub const RESET_TOKEN_PREFIX: &str = "reset_";

pub const RESET_TOKEN_TTL: Duration = Duration::hours(24);

const RESET_TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    hasher: CredentialHasher,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, hasher: CredentialHasher) -> Self {
        Self { store, hasher }
    }

    /// Issue a single-use reset token. The raw token is returned to the caller
    /// and only its prefixed key is stored.
    pub async fn create_reset_token(&self, identity_id: IdentityId) -> DomainResult<String> {
        self.create_reset_token_at(identity_id, Utc::now()).await
    }

    pub async fn create_reset_token_at(&self, identity_id: IdentityId, now: DateTime<Utc>) -> DomainResult<String> {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.store
            .insert_session(SessionRecord {
                identity_id,
                token_key: reset_key(&token),
                expires_at: now + RESET_TOKEN_TTL,
                created_at: now,
            })
            .await?;

        tracing::info!(user_id = %identity_id, "reset token created");
        Ok(token)
    }

    pub async fn validate_reset_token(&self, token: &str) -> DomainResult<Option<IdentityId>> {
        self.validate_reset_token_at(token, Utc::now()).await
    }

    pub async fn validate_reset_token_at(&self, token: &str, now: DateTime<Utc>) -> DomainResult<Option<IdentityId>> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        Ok(self.store.find_live(&reset_key(token), now).await?)
    }

    /// Replace the owner's password and drop all of their sessions.
    ///
    /// Returns the owner on success, `None` when the token is unknown, expired
    /// or already consumed. Nothing changes in the `None` case.
    pub async fn consume_and_reset_password(&self, token: &str, new_password: &str) -> DomainResult<Option<IdentityId>> {
        self.consume_and_reset_password_at(token, new_password, Utc::now()).await
    }

    pub async fn consume_and_reset_password_at(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<IdentityId>> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        let credential = self.hasher.hash(new_password, None);
        let owner = self.store.reset_credential(&reset_key(token), now, &credential).await?;
        match owner {
            Some(id) => tracing::info!(user_id = %id, "password reset via token"),
            None => tracing::info!("reset token rejected"),
        }
        Ok(owner)
    }

    /// Idempotent.
    pub async fn delete_all_sessions(&self, identity_id: IdentityId) -> DomainResult<()> {
        let removed = self.store.delete_for_identity(identity_id).await?;
        tracing::debug!(user_id = %identity_id, removed, "sessions deleted");
        Ok(())
    }
}

fn reset_key(token: &str) -> String {
    format!("{RESET_TOKEN_PREFIX}{}", token.trim())
}

#[cfg(test)]
mod tests {
    use kb_auth::Role;

    use super::*;
    use crate::store::{IdentityStore, InMemoryStore, NewIdentity};

    async fn setup() -> (Arc<InMemoryStore>, SessionService, CredentialHasher, IdentityId) {
        let store = Arc::new(InMemoryStore::new());
        let hasher = CredentialHasher::with_iterations(1_000);
        let identity = store
            .insert(NewIdentity {
                username: "dana".into(),
                email: "dana@example.com".into(),
                credential: hasher.hash("old-password", None),
                full_name: None,
                role: Role::Viewer,
                client_access: vec![],
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let service = SessionService::new(store.clone(), hasher);
        (store, service, hasher, identity.id)
    }

    #[tokio::test]
    async fn token_shape_and_storage_key() {
        let (store, service, _, id) = setup().await;
        let token = service.create_reset_token(id).await.unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let now = Utc::now();
        assert_eq!(store.find_live(&format!("reset_{token}"), now).await.unwrap(), Some(id));
        assert_eq!(store.find_live(&token, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expiry_is_enforced_on_read() {
        let (_, service, _, id) = setup().await;
        let issued = Utc::now();
        let token = service.create_reset_token_at(id, issued).await.unwrap();

        let almost = issued + Duration::hours(23);
        assert_eq!(service.validate_reset_token_at(&token, almost).await.unwrap(), Some(id));

        let after = issued + Duration::hours(24);
        assert_eq!(service.validate_reset_token_at(&token, after).await.unwrap(), None);
        assert_eq!(service.consume_and_reset_password_at(&token, "new-password", after).await.unwrap(), None);
    }

    #[tokio::test]
    async fn consumed_token_is_dead_and_old_password_fails() {
        let (store, service, hasher, id) = setup().await;
        let token = service.create_reset_token(id).await.unwrap();
        service.create_reset_token(id).await.unwrap();

        assert_eq!(service.validate_reset_token(&token).await.unwrap(), Some(id));
        assert_eq!(service.consume_and_reset_password(&token, "new-password").await.unwrap(), Some(id));

        assert_eq!(service.validate_reset_token(&token).await.unwrap(), None);
        assert_eq!(store.session_count(id), 0);

        let stored = store.find_by_id(id).await.unwrap().unwrap().credential;
        assert!(!hasher.verify("old-password", &stored.hash, &stored.salt));
        assert!(hasher.verify("new-password", &stored.hash, &stored.salt));
    }

    #[tokio::test]
    async fn concurrent_consumers_have_one_winner() {
        let (_, service, _, id) = setup().await;
        let token = service.create_reset_token(id).await.unwrap();

        let (a, b) = tokio::join!(
            service.consume_and_reset_password(&token, "first-password"),
            service.consume_and_reset_password(&token, "second-password"),
        );
        let winners = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn blank_tokens_never_match() {
        let (_, service, _, _) = setup().await;
        assert_eq!(service.validate_reset_token("").await.unwrap(), None);
        assert_eq!(service.consume_and_reset_password("  ", "whatever1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_all_sessions_is_idempotent() {
        let (store, service, _, id) = setup().await;
        service.create_reset_token(id).await.unwrap();
        service.delete_all_sessions(id).await.unwrap();
        service.delete_all_sessions(id).await.unwrap();
        assert_eq!(store.session_count(id), 0);
    }
}
