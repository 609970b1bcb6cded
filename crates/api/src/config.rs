//! Process configuration from environment variables.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BIND_ADDR '{0}' is not a socket address")]
    InvalidBindAddr(String),

    #[error("KB_SEED_ADMIN_EMAIL and KB_SEED_ADMIN_PASSWORD must be set together")]
    IncompleteSeedAdmin,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedAdmin").field("email", &self.email).finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Postgres when set, in-memory stores otherwise.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub seed_admin: Option<SeedAdmin>,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("database", &self.database_url.as_ref().map(|_| "postgres"))
            .field("bind_addr", &self.bind_addr)
            .field("seed_admin", &self.seed_admin)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::InvalidBindAddr(bind_raw))?;

        let seed_admin = match (get("KB_SEED_ADMIN_EMAIL"), get("KB_SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteSeedAdmin),
        };

        Ok(Self {
            jwt_secret,
            database_url: get("DATABASE_URL"),
            bind_addr,
            seed_admin,
        })
    }

    /// Config for tests and local runs: in-memory stores, ephemeral port.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            database_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            seed_admin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ApiConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(cfg.seed_admin, None);
    }

    #[test]
    fn explicit_values() {
        let cfg = from(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://kb@localhost/kb"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("KB_SEED_ADMIN_EMAIL", "root@example.com"),
            ("KB_SEED_ADMIN_PASSWORD", "root-password"),
        ])
        .unwrap();
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://kb@localhost/kb"));
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.seed_admin.unwrap().email, "root@example.com");
    }

    #[test]
    fn invalid_values() {
        assert_eq!(
            from(&[("BIND_ADDR", "localhost")]),
            Err(ConfigError::InvalidBindAddr("localhost".into()))
        );
        assert_eq!(
            from(&[("KB_SEED_ADMIN_EMAIL", "root@example.com")]),
            Err(ConfigError::IncompleteSeedAdmin)
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let mut cfg = ApiConfig::in_memory("top-secret");
        cfg.seed_admin = Some(SeedAdmin {
            email: "root@example.com".into(),
            password: "hunter2-hunter2".into(),
        });
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("hunter2"));
    }
}
