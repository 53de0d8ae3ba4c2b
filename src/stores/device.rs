use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Device;

/// Device posture records, unique per `(tenant, device_identifier)`.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Upsert. Re-registration keeps the original row id and compliance
    /// verdict, refreshing identity fields and `last_seen_at`.
    async fn register(&self, device: Device) -> Result<Device, StoreError>;

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Device>, StoreError>;

    async fn get_by_identifier(
        &self,
        tenant_id: Uuid,
        device_identifier: &str,
    ) -> Result<Option<Device>, StoreError>;

    /// Mutates only the posture fields.
    async fn update_posture(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        is_compliant: bool,
        risk_score: u8,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlDeviceStore {
    pool: MySqlPool,
}

impl MySqlDeviceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::mysql::MySqlRow) -> Result<Device, StoreError> {
        let id: String = row.try_get("id")?;
        let tenant_id: String = row.try_get("tenant_id")?;
        let user_id: String = row.try_get("user_id")?;
        let risk_score: u8 = row.try_get("risk_score")?;
        let last_seen_at: DateTime<Utc> = row.try_get("last_seen_at")?;

        Ok(Device {
            id: Uuid::parse_str(&id)
                .map_err(|e| StoreError::Unavailable(format!("bad id column: {e}")))?,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| StoreError::Unavailable(format!("bad tenant_id column: {e}")))?,
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| StoreError::Unavailable(format!("bad user_id column: {e}")))?,
            device_identifier: row.try_get("device_identifier")?,
            os: row.try_get("os")?,
            os_version: row.try_get("os_version")?,
            is_managed: row.try_get("is_managed")?,
            is_compliant: row.try_get("is_compliant")?,
            risk_score,
            last_seen_at,
        })
    }
}

const DEVICE_COLUMNS: &str = "id, tenant_id, user_id, device_identifier, os, os_version, \
     is_managed, is_compliant, risk_score, last_seen_at";

#[async_trait]
impl DeviceStore for MySqlDeviceStore {
    async fn register(&self, device: Device) -> Result<Device, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO devices
            (id, tenant_id, user_id, device_identifier, os, os_version,
             is_managed, is_compliant, risk_score, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                user_id = VALUES(user_id),
                os = VALUES(os),
                os_version = VALUES(os_version),
                is_managed = VALUES(is_managed),
                last_seen_at = VALUES(last_seen_at)
            "#,
        )
        .bind(device.id.to_string())
        .bind(device.tenant_id.to_string())
        .bind(device.user_id.to_string())
        .bind(&device.device_identifier)
        .bind(&device.os)
        .bind(&device.os_version)
        .bind(device.is_managed)
        .bind(device.is_compliant)
        .bind(device.risk_score)
        .bind(device.last_seen_at)
        .execute(&self.pool)
        .await?;

        self.get_by_identifier(device.tenant_id, &device.device_identifier)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_by_identifier(
        &self,
        tenant_id: Uuid,
        device_identifier: &str,
    ) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE tenant_id = ? AND device_identifier = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(device_identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn update_posture(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        is_compliant: bool,
        risk_score: u8,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE devices SET is_compliant = ?, risk_score = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(is_compliant)
        .bind(risk_score)
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<(Uuid, String), Device>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn register(&self, device: Device) -> Result<Device, StoreError> {
        let mut devices = self.devices.write().await;
        let key = (device.tenant_id, device.device_identifier.clone());
        let stored = match devices.get_mut(&key) {
            Some(existing) => {
                existing.user_id = device.user_id;
                existing.os = device.os;
                existing.os_version = device.os_version;
                existing.is_managed = device.is_managed;
                existing.last_seen_at = device.last_seen_at;
                existing.clone()
            }
            None => {
                devices.insert(key, device.clone());
                device
            }
        };
        Ok(stored)
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .values()
            .find(|d| d.tenant_id == tenant_id && d.id == id)
            .cloned())
    }

    async fn get_by_identifier(
        &self,
        tenant_id: Uuid,
        device_identifier: &str,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .get(&(tenant_id, device_identifier.to_string()))
            .cloned())
    }

    async fn update_posture(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        is_compliant: bool,
        risk_score: u8,
    ) -> Result<bool, StoreError> {
        let mut devices = self.devices.write().await;
        match devices
            .values_mut()
            .find(|d| d.tenant_id == tenant_id && d.id == id)
        {
            Some(device) => {
                device.is_compliant = is_compliant;
                device.risk_score = risk_score;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
