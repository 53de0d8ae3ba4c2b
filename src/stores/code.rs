use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::AuthorizationCode;
use crate::utils::token::hash_token;

/// Single-use authorization codes.
///
/// `consume` is the only read path and it deletes: the first caller wins,
/// every later caller (and every caller presenting an expired code) sees
/// `None`. Binding checks against client/redirect/tenant happen in the
/// orchestrator after the delete, so a failed exchange can never leave a
/// reusable code behind.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Idempotent by code value.
    async fn save(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Atomic get-and-delete.
    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlCodeStore {
    pool: MySqlPool,
}

impl MySqlCodeStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeStore for MySqlCodeStore {
    async fn save(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        // The code is random and never re-issued; the hash is the identity.
        sqlx::query(
            r#"
            INSERT INTO authorization_codes
            (code_hash, client_id, tenant_id, redirect_uri, scope,
             code_challenge, code_challenge_method, subject_id, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE code_hash = code_hash
            "#,
        )
        .bind(hash_token(&code.code))
        .bind(&code.client_id)
        .bind(code.tenant_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.subject_id)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        let code_hash = hash_token(code);
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent redemptions of the same code.
        let row = sqlx::query(
            r#"
            SELECT client_id, tenant_id, redirect_uri, scope,
                   code_challenge, code_challenge_method, subject_id, expires_at
            FROM authorization_codes
            WHERE code_hash = ?
            FOR UPDATE
            "#,
        )
        .bind(&code_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM authorization_codes WHERE code_hash = ?")
            .bind(&code_hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let tenant_id: String = row.try_get("tenant_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let record = AuthorizationCode {
            code: code.to_string(),
            client_id: row.try_get("client_id")?,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| StoreError::Unavailable(format!("bad tenant_id column: {e}")))?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            code_challenge: row.try_get("code_challenge")?,
            code_challenge_method: row.try_get("code_challenge_method")?,
            subject_id: row.try_get("subject_id")?,
            expires_at,
        };

        if record.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < ?")
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
pub struct InMemoryCodeStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

impl InMemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn save(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        let mut codes = self.codes.write().await;
        codes.entry(hash_token(&code.code)).or_insert(code);
        Ok(())
    }

    async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        // Single write-lock section: remove decides the winner.
        let removed = self.codes.write().await.remove(&hash_token(code));
        Ok(removed.filter(|c| !c.is_expired(Utc::now())))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut codes = self.codes.write().await;
        let now = Utc::now();
        let before = codes.len();
        codes.retain(|_, c| !c.is_expired(now));
        Ok((before - codes.len()) as u64)
    }
}
