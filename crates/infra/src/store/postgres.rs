//! Postgres-backed storage ports.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | StoreError |
//! |------------|---------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | n/a | `Unavailable` |
//! | column decode failure | n/a | `Corrupt` |
//!
//! Multi-statement operations (`reset_credential`, `delete_cascade`) run in a
//! single transaction; everything else is one statement on the pool.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use kb_auth::PasswordHash;
use kb_core::{IdentityId, TenantId};

use super::{
    AuditEntry, AuditSink, Identity, IdentityChanges, IdentityFilter, IdentityPage, IdentityStore, NewIdentity,
    PageRequest, SessionRecord, SessionStore, StoreError, TenantStore, TenantSummary,
};

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

const IDENTITY_COLUMNS: &str = "id, username, email, password_hash, salt, full_name, role, client_access, \
     is_active, metadata, last_login, created_at, updated_at";

const NOT_DELETED: &str = "COALESCE((metadata->>'is_deleted')::boolean, false) = false";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the identity tables if they are missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_identity(&self, op: &str, sql: &str, bind: IdentityKey<'_>) -> Result<Option<Identity>, StoreError> {
        let query = sqlx::query(sql);
        let query = match bind {
            IdentityKey::Id(id) => query.bind(id.get()),
            IdentityKey::Email(email) => query.bind(email),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        row.as_ref().map(identity_from_row).transpose()
    }
}

enum IdentityKey<'a> {
    Id(IdentityId),
    Email(&'a str),
}

#[async_trait]
impl IdentityStore for PgStore {
    #[instrument(skip(self, email), err)]
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1 AND is_active = true AND {NOT_DELETED}");
        self.fetch_identity("find_active_by_email", &sql, IdentityKey::Email(email)).await
    }

    #[instrument(skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1");
        self.fetch_identity("find_by_email", &sql, IdentityKey::Email(email)).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1");
        self.fetch_identity("find_by_id", &sql, IdentityKey::Id(id)).await
    }

    #[instrument(skip(self, new), fields(role = %new.role), err)]
    async fn insert(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users
                (username, email, password_hash, salt, full_name, role, client_access,
                 is_active, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{{}}'::jsonb, $9, $9)
            RETURNING {IDENTITY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.credential.hash)
            .bind(&new.credential.salt)
            .bind(&new.full_name)
            .bind(new.role.as_str())
            .bind(tenant_ids(&new.client_access))
            .bind(new.is_active)
            .bind(new.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_identity", e))?;
        identity_from_row(&row)
    }

    #[instrument(skip(self, changes), fields(user_id = %id), err)]
    async fn update(
        &self,
        id: IdentityId,
        changes: &IdentityChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users SET
                full_name     = COALESCE($2, full_name),
                role          = COALESCE($3, role),
                client_access = COALESCE($4::bigint[], client_access),
                is_active     = COALESCE($5, is_active),
                updated_at    = $6
            WHERE id = $1 AND {NOT_DELETED}
            RETURNING {IDENTITY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(&changes.full_name)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.client_access.as_deref().map(tenant_ids))
            .bind(changes.is_active)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_identity", e))?;
        row.as_ref().map(identity_from_row).transpose()
    }

    #[instrument(skip(self, credential), fields(user_id = %id), err)]
    async fn set_credential(
        &self,
        id: IdentityId,
        credential: &PasswordHash,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE users SET password_hash = $2, salt = $3, updated_at = $4 WHERE id = $1")
            .bind(id.get())
            .bind(&credential.hash)
            .bind(&credential.salt)
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_credential", e))?;
        Ok(done.rows_affected() > 0)
    }

    #[instrument(skip(self, value), fields(user_id = %id), err)]
    async fn set_metadata(
        &self,
        id: IdentityId,
        key: &str,
        value: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE users
            SET metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object($2::text, $3::jsonb),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_metadata", e))?;
        Ok(done.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn record_login(&self, id: IdentityId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id.get())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_cascade(&self, id: IdentityId) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_sessions", e))?;

        sqlx::query("DELETE FROM audit_log WHERE user_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_audit_rows", e))?;

        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_identity", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(done.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), fields(page = page.page, limit = page.limit), err)]
    async fn list(&self, filter: &IdentityFilter, page: PageRequest) -> Result<IdentityPage, StoreError> {
        let predicate = format!(
            r#"
            {NOT_DELETED}
                AND ($1::bigint IS NULL OR id <> $1)
                AND ($2::text IS NULL OR full_name ILIKE $2 OR email ILIKE $2 OR username ILIKE $2)
                AND ($3::text IS NULL OR role = $3)
                AND ($4::boolean IS NULL OR is_active = $4)
                AND ($5::bigint IS NULL OR $5 = ANY(client_access))
            "#
        );
        let exclude = filter.exclude.map(IdentityId::get);
        let pattern = filter.search.as_deref().map(like_pattern);
        let role = filter.role.map(|r| r.as_str());
        let tenant = filter.tenant.map(TenantId::get);

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM users WHERE {predicate}"))
            .bind(exclude)
            .bind(&pattern)
            .bind(role)
            .bind(filter.is_active)
            .bind(tenant)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_identities", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE {predicate} \
             ORDER BY created_at DESC, id DESC LIMIT $6 OFFSET $7"
        ))
        .bind(exclude)
        .bind(&pattern)
        .bind(role)
        .bind(filter.is_active)
        .bind(tenant)
        .bind(i64::from(page.limit))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_identities", e))?;

        let items = rows.iter().map(identity_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(IdentityPage {
            items,
            total: u64::try_from(total).unwrap_or(0),
            page: page.page,
            limit: page.limit,
        })
    }
}

#[async_trait]
impl SessionStore for PgStore {
    #[instrument(skip(self, record), fields(user_id = %record.identity_id), err)]
    async fn insert_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_sessions (user_id, token_hash, expires_at, created_at) VALUES ($1, $2, $3, $4)")
            .bind(record.identity_id.get())
            .bind(&record.token_key)
            .bind(record.expires_at)
            .bind(record.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_session", e))?;
        Ok(())
    }

    #[instrument(skip(self, token_key), err)]
    async fn find_live(&self, token_key: &str, now: DateTime<Utc>) -> Result<Option<IdentityId>, StoreError> {
        let row = sqlx::query("SELECT user_id FROM user_sessions WHERE token_hash = $1 AND expires_at > $2")
            .bind(token_key)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_session", e))?;
        row.map(|r| column::<i64>(&r, "user_id").map(IdentityId::new)).transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_for_identity(&self, id: IdentityId) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_sessions", e))?;
        Ok(done.rows_affected())
    }

    /// `FOR UPDATE` serialises concurrent consumers of the same token: the
    /// loser re-reads after the winner commits and finds the row gone.
    #[instrument(skip(self, token_key, credential), err)]
    async fn reset_credential(
        &self,
        token_key: &str,
        now: DateTime<Utc>,
        credential: &PasswordHash,
    ) -> Result<Option<IdentityId>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            "SELECT user_id FROM user_sessions WHERE token_hash = $1 AND expires_at > $2 FOR UPDATE",
        )
        .bind(token_key)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_reset_token", e))?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };
        let owner: i64 = column(&row, "user_id")?;

        let updated = sqlx::query("UPDATE users SET password_hash = $2, salt = $3, updated_at = $4 WHERE id = $1")
            .bind(owner)
            .bind(&credential.hash)
            .bind(&credential.salt)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_credential", e))?;
        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_sessions", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Some(IdentityId::new(owner)))
    }
}

#[async_trait]
impl TenantStore for PgStore {
    #[instrument(skip(self), err)]
    async fn active_tenants(&self) -> Result<Vec<TenantSummary>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT client_id, name FROM clients WHERE is_active = true AND {NOT_DELETED} ORDER BY name"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_tenants", e))?;
        rows.iter().map(tenant_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    async fn active_tenants_in(&self, ids: &[TenantId]) -> Result<Vec<TenantSummary>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(&format!(
            "SELECT client_id, name FROM clients \
             WHERE client_id = ANY($1) AND is_active = true AND {NOT_DELETED} ORDER BY name"
        ))
        .bind(tenant_ids(ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_tenants_in", e))?;
        rows.iter().map(tenant_from_row).collect()
    }
}

#[async_trait]
impl AuditSink for PgStore {
    #[instrument(skip(self, entry), fields(action = entry.action), err)]
    async fn record(&self, entry: AuditEntry, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, resource_type, resource_id, client_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.actor.map(IdentityId::get))
        .bind(entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.tenant_id.map(TenantId::get))
        .bind(&entry.details)
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_audit", e))?;
        Ok(())
    }
}

fn tenant_ids(ids: &[TenantId]) -> Vec<i64> {
    ids.iter().map(|t| t.get()).collect()
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column '{name}': {e}")))
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let access: Vec<i64> = column(row, "client_access")?;
    Ok(Identity {
        id: IdentityId::new(column(row, "id")?),
        username: column(row, "username")?,
        email: column(row, "email")?,
        credential: PasswordHash {
            hash: column(row, "password_hash")?,
            salt: column(row, "salt")?,
        },
        full_name: column(row, "full_name")?,
        role: column(row, "role")?,
        client_access: access.into_iter().map(TenantId::new).collect(),
        is_active: column(row, "is_active")?,
        metadata: column(row, "metadata")?,
        last_login: column(row, "last_login")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn tenant_from_row(row: &PgRow) -> Result<TenantSummary, StoreError> {
    Ok(TenantSummary {
        id: TenantId::new(column(row, "client_id")?),
        name: column(row, "name")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("op", sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("op", sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }
}
