use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::TotpEnrollment;

/// TOTP enrollments per `(tenant, identity)`.
#[async_trait]
pub trait TotpStore: Send + Sync {
    /// Re-enrollment replaces the secret and resets `verified`.
    async fn upsert(&self, enrollment: TotpEnrollment) -> Result<(), StoreError>;

    async fn get(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<TotpEnrollment>, StoreError>;

    async fn mark_verified(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, tenant_id: Uuid, identity_id: Uuid) -> Result<bool, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlTotpStore {
    pool: MySqlPool,
}

impl MySqlTotpStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TotpStore for MySqlTotpStore {
    async fn upsert(&self, enrollment: TotpEnrollment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO totp_enrollments
            (tenant_id, identity_id, secret, verified, created_at, verified_at)
            VALUES (?, ?, ?, false, ?, NULL)
            ON DUPLICATE KEY UPDATE
                secret = VALUES(secret),
                verified = false,
                created_at = VALUES(created_at),
                verified_at = NULL
            "#,
        )
        .bind(enrollment.tenant_id.to_string())
        .bind(enrollment.identity_id.to_string())
        .bind(&enrollment.secret)
        .bind(enrollment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<TotpEnrollment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT secret, verified, created_at, verified_at
            FROM totp_enrollments
            WHERE tenant_id = ? AND identity_id = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(identity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TotpEnrollment {
            identity_id,
            tenant_id,
            secret: row.try_get("secret")?,
            verified: row.try_get("verified")?,
            created_at: row.try_get("created_at")?,
            verified_at: row.try_get("verified_at")?,
        }))
    }

    async fn mark_verified(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE totp_enrollments
            SET verified = true, verified_at = ?
            WHERE tenant_id = ? AND identity_id = ?
            "#,
        )
        .bind(at)
        .bind(tenant_id.to_string())
        .bind(identity_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, tenant_id: Uuid, identity_id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM totp_enrollments WHERE tenant_id = ? AND identity_id = ?")
                .bind(tenant_id.to_string())
                .bind(identity_id.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryTotpStore {
    enrollments: RwLock<HashMap<(Uuid, Uuid), TotpEnrollment>>,
}

impl InMemoryTotpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TotpStore for InMemoryTotpStore {
    async fn upsert(&self, mut enrollment: TotpEnrollment) -> Result<(), StoreError> {
        enrollment.verified = false;
        enrollment.verified_at = None;
        self.enrollments
            .write()
            .await
            .insert((enrollment.tenant_id, enrollment.identity_id), enrollment);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
    ) -> Result<Option<TotpEnrollment>, StoreError> {
        Ok(self
            .enrollments
            .read()
            .await
            .get(&(tenant_id, identity_id))
            .cloned())
    }

    async fn mark_verified(
        &self,
        tenant_id: Uuid,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut enrollments = self.enrollments.write().await;
        match enrollments.get_mut(&(tenant_id, identity_id)) {
            Some(enrollment) => {
                enrollment.verified = true;
                enrollment.verified_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tenant_id: Uuid, identity_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .enrollments
            .write()
            .await
            .remove(&(tenant_id, identity_id))
            .is_some())
    }
}
