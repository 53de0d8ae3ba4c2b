use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::MySqlPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::LoginAttempt;

/// Failed-attempt counters and lockout windows per `(tenant, username)`.
///
/// The store records facts; the orchestrator owns the policy (5 failures in
/// 15 minutes locks for 15 minutes, success unlocks). `is_locked` is
/// self-healing: reading an expired lockout clears it.
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn record_attempt(&self, attempt: LoginAttempt) -> Result<(), StoreError>;

    /// Failed attempts within `window` of now.
    async fn recent_failures(
        &self,
        tenant_id: Uuid,
        username: &str,
        window: Duration,
    ) -> Result<u32, StoreError>;

    /// `Some(locked_until)` while a lockout is active.
    async fn is_locked(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn lock(
        &self,
        tenant_id: Uuid,
        username: &str,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn unlock(&self, tenant_id: Uuid, username: &str) -> Result<(), StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlLoginAttemptStore {
    pool: MySqlPool,
}

impl MySqlLoginAttemptStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptStore for MySqlLoginAttemptStore {
    async fn record_attempt(&self, attempt: LoginAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, tenant_id, username, ip, success, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(attempt.tenant_id.to_string())
        .bind(&attempt.username)
        .bind(&attempt.ip)
        .bind(attempt.success)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_failures(
        &self,
        tenant_id: Uuid,
        username: &str,
        window: Duration,
    ) -> Result<u32, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE tenant_id = ? AND username = ? AND success = false AND attempted_at > ?
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(username)
        .bind(Utc::now() - window)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u32)
    }

    async fn is_locked(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let locked_until = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT locked_until FROM account_lockouts WHERE tenant_id = ? AND username = ?",
        )
        .bind(tenant_id.to_string())
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match locked_until {
            Some(until) if until > Utc::now() => Ok(Some(until)),
            Some(_) => {
                // Expired: clear on read.
                self.unlock(tenant_id, username).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn lock(
        &self,
        tenant_id: Uuid,
        username: &str,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO account_lockouts (tenant_id, username, locked_until)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE locked_until = VALUES(locked_until)
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(username)
        .bind(until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unlock(&self, tenant_id: Uuid, username: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM account_lockouts WHERE tenant_id = ? AND username = ?")
            .bind(tenant_id.to_string())
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryLoginAttemptStore {
    attempts: RwLock<HashMap<(Uuid, String), Vec<LoginAttempt>>>,
    lockouts: RwLock<HashMap<(Uuid, String), DateTime<Utc>>>,
}

impl InMemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginAttemptStore for InMemoryLoginAttemptStore {
    async fn record_attempt(&self, attempt: LoginAttempt) -> Result<(), StoreError> {
        let mut attempts = self.attempts.write().await;
        attempts
            .entry((attempt.tenant_id, attempt.username.clone()))
            .or_default()
            .push(attempt);
        Ok(())
    }

    async fn recent_failures(
        &self,
        tenant_id: Uuid,
        username: &str,
        window: Duration,
    ) -> Result<u32, StoreError> {
        let attempts = self.attempts.read().await;
        let cutoff = Utc::now() - window;
        Ok(attempts
            .get(&(tenant_id, username.to_string()))
            .map(|list| {
                list.iter()
                    .filter(|a| !a.success && a.attempted_at > cutoff)
                    .count() as u32
            })
            .unwrap_or(0))
    }

    async fn is_locked(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = (tenant_id, username.to_string());
        let mut lockouts = self.lockouts.write().await;
        match lockouts.get(&key).copied() {
            Some(until) if until > Utc::now() => Ok(Some(until)),
            Some(_) => {
                lockouts.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn lock(
        &self,
        tenant_id: Uuid,
        username: &str,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lockouts
            .write()
            .await
            .insert((tenant_id, username.to_string()), until);
        Ok(())
    }

    async fn unlock(&self, tenant_id: Uuid, username: &str) -> Result<(), StoreError> {
        self.lockouts
            .write()
            .await
            .remove(&(tenant_id, username.to_string()));
        Ok(())
    }
}
