//! Service graph wiring: stores, codec, gate and the identity services.

use std::sync::Arc;

use kb_auth::{AccessEvaluator, CredentialHasher, RequestGate, TokenCodec};
use kb_core::DomainError;
use kb_infra::{AuthService, IdentityAdmin, InMemoryStore, LogNotifier, PgStore, StorePorts};

use crate::config::ApiConfig;

/// Everything a handler may need, built once per process.
#[derive(Clone)]
pub struct AppServices {
    pub gate: Arc<RequestGate>,
    pub auth: AuthService,
    pub admin: IdentityAdmin,
}

impl AppServices {
    pub fn new(ports: StorePorts, jwt_secret: &str, hasher: CredentialHasher) -> Self {
        let codec = TokenCodec::new(jwt_secret.as_bytes());
        let evaluator = AccessEvaluator::standard();
        let gate = Arc::new(RequestGate::new(codec.clone(), evaluator.clone()));

        Self {
            gate,
            auth: AuthService::new(&ports, codec, evaluator, hasher, Arc::new(LogNotifier)),
            admin: IdentityAdmin::new(&ports, hasher),
        }
    }

    /// In-memory stores; returns the store for seeding.
    pub fn in_memory(jwt_secret: &str, hasher: CredentialHasher) -> (Self, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let services = Self::new(StorePorts::in_memory(store.clone()), jwt_secret, hasher);
        (services, store)
    }

    /// Postgres when `DATABASE_URL` is set, in-memory otherwise. Seeds the
    /// bootstrap super-admin when configured.
    pub async fn from_config(config: &ApiConfig) -> Result<Self, DomainError> {
        let hasher = CredentialHasher::new();
        let services = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url).await?;
                store.ensure_schema().await?;
                tracing::info!("using postgres storage");
                Self::new(StorePorts::postgres(store), &config.jwt_secret, hasher)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory storage");
                Self::in_memory(&config.jwt_secret, hasher).0
            }
        };

        if let Some(seed) = &config.seed_admin {
            services.admin.seed_admin(&seed.email, &seed.password).await?;
        }
        Ok(services)
    }
}
