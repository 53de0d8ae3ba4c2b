use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::RevokedTokenRecord;
use crate::utils::token::hash_token;

/// Hash-indexed denylist of revoked tokens.
///
/// Presence means inactive, regardless of signature validity. `revoke` is
/// insert-or-ignore, so repeated revocations leave the store unchanged.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError>;

    /// Drop entries revoked before `older_than`. Every revocable token has
    /// expired long before the 30-day compaction horizon.
    async fn compact(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlRevocationStore {
    pool: MySqlPool,
}

impl MySqlRevocationStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for MySqlRevocationStore {
    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, revoked_at)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE token_hash = token_hash
            "#,
        )
        .bind(hash_token(token))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM revoked_tokens WHERE token_hash = ?",
        )
        .bind(hash_token(token))
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn compact(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE revoked_at < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryRevocationStore {
    revoked: RwLock<HashMap<String, RevokedTokenRecord>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let mut revoked = self.revoked.write().await;
        let token_hash = hash_token(token);
        revoked
            .entry(token_hash.clone())
            .or_insert_with(|| RevokedTokenRecord {
                token_hash,
                revoked_at: Utc::now(),
            });
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.revoked.read().await.contains_key(&hash_token(token)))
    }

    async fn compact(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut revoked = self.revoked.write().await;
        let before = revoked.len();
        revoked.retain(|_, record| record.revoked_at >= older_than);
        Ok((before - revoked.len()) as u64)
    }
}
