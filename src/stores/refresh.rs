use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{RefreshTokenRecord, SubjectType};
use crate::utils::token::hash_token;

/// Rotatable refresh tokens, indexed by token hash.
///
/// Rotation is `consume(old)` then `save(new)`: consume is a
/// delete-with-witness, so of any number of concurrent rotations of the same
/// token exactly one observes the record. If the subsequent save fails the
/// grant fails and the caller's token is already gone - an accepted loss
/// that forces a fresh login.
#[async_trait]
pub trait RefreshStore: Send + Sync {
    async fn save(&self, token: &str, record: RefreshTokenRecord) -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Delete-with-witness: `Some` only for the caller whose delete landed.
    async fn consume(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    async fn delete(&self, token: &str) -> Result<bool, StoreError>;

    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlRefreshStore {
    pool: MySqlPool,
}

impl MySqlRefreshStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::mysql::MySqlRow) -> Result<RefreshTokenRecord, StoreError> {
        let tenant_id: String = row.try_get("tenant_id")?;
        let subject_type: String = row.try_get("subject_type")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        Ok(RefreshTokenRecord {
            client_id: row.try_get("client_id")?,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| StoreError::Unavailable(format!("bad tenant_id column: {e}")))?,
            scope: row.try_get("scope")?,
            subject_type: SubjectType::parse(&subject_type)
                .ok_or_else(|| StoreError::Unavailable("bad subject_type column".into()))?,
            subject_id: row.try_get("subject_id")?,
            expires_at,
        })
    }
}

const REFRESH_COLUMNS: &str =
    "client_id, tenant_id, scope, subject_type, subject_id, expires_at";

#[async_trait]
impl RefreshStore for MySqlRefreshStore {
    async fn save(&self, token: &str, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
            (token_hash, client_id, tenant_id, scope, subject_type, subject_id, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash_token(token))
        .bind(&record.client_id)
        .bind(record.tenant_id.to_string())
        .bind(&record.scope)
        .bind(record.subject_type.as_str())
        .bind(&record.subject_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = ?"
        ))
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn consume(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let token_hash = hash_token(token);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = ? FOR UPDATE"
        ))
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }
        Self::from_row(&row).map(Some)
    }

    async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryRefreshStore {
    tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshStore for InMemoryRefreshStore {
    async fn save(&self, token: &str, record: RefreshTokenRecord) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(hash_token(token), record);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&hash_token(token)).cloned())
    }

    async fn consume(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.tokens.write().await.remove(&hash_token(token)))
    }

    async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.tokens.write().await.remove(&hash_token(token)).is_some())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().await;
        let now = Utc::now();
        let before = tokens.len();
        tokens.retain(|_, r| !r.is_expired(now));
        Ok((before - tokens.len()) as u64)
    }
}
