use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::SecurityEvent;

/// Append-only log of critical security events.
///
/// Introspection uses `latest_critical_event` to invalidate tokens issued
/// before a qualifying event; the risk engine uses it to weight recent
/// incidents.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn ingest(&self, event: SecurityEvent) -> Result<(), StoreError>;

    /// Most recent event for `subject_id` strictly newer than `since`.
    async fn latest_critical_event(
        &self,
        tenant_id: Uuid,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlSignalStore {
    pool: MySqlPool,
}

impl MySqlSignalStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for MySqlSignalStore {
    async fn ingest(&self, event: SecurityEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO security_events (id, tenant_id, subject_id, event_type, event_time, reason)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.tenant_id.to_string())
        .bind(&event.subject_id)
        .bind(&event.event_type)
        .bind(event.event_time)
        .bind(&event.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_critical_event(
        &self,
        tenant_id: Uuid,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, subject_id, event_type, event_time, reason
            FROM security_events
            WHERE tenant_id = ? AND subject_id = ? AND event_time > ?
            ORDER BY event_time DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(subject_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        Ok(Some(SecurityEvent {
            id: Uuid::parse_str(&id)
                .map_err(|e| StoreError::Unavailable(format!("bad id column: {e}")))?,
            tenant_id,
            subject_id: row.try_get("subject_id")?,
            event_type: row.try_get("event_type")?,
            event_time: row.try_get("event_time")?,
            reason: row.try_get("reason")?,
        }))
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemorySignalStore {
    events: RwLock<HashMap<(Uuid, String), Vec<SecurityEvent>>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn ingest(&self, event: SecurityEvent) -> Result<(), StoreError> {
        self.events
            .write()
            .await
            .entry((event.tenant_id, event.subject_id.clone()))
            .or_default()
            .push(event);
        Ok(())
    }

    async fn latest_critical_event(
        &self,
        tenant_id: Uuid,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .get(&(tenant_id, subject_id.to_string()))
            .and_then(|events| {
                events
                    .iter()
                    .filter(|e| e.event_time > since)
                    .max_by_key(|e| e.event_time)
                    .cloned()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn returns_most_recent_event_after_since() {
        let store = InMemorySignalStore::new();
        let tenant = Uuid::new_v4();
        let t0 = Utc::now();

        for (offset, kind) in [(1, "password-changed"), (3, "mfa-removed"), (2, "login")] {
            store
                .ingest(SecurityEvent::new(
                    tenant,
                    "user-1",
                    kind,
                    t0 + Duration::seconds(offset),
                    None,
                ))
                .await
                .unwrap();
        }

        let latest = store
            .latest_critical_event(tenant, "user-1", t0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.event_type, "mfa-removed");
    }

    #[tokio::test]
    async fn since_bound_is_strict() {
        let store = InMemorySignalStore::new();
        let tenant = Uuid::new_v4();
        let at = Utc::now();

        store
            .ingest(SecurityEvent::new(tenant, "user-1", "password-changed", at, None))
            .await
            .unwrap();

        assert!(store
            .latest_critical_event(tenant, "user-1", at)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .latest_critical_event(tenant, "user-1", at - Duration::seconds(1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn events_are_tenant_and_subject_scoped() {
        let store = InMemorySignalStore::new();
        let tenant = Uuid::new_v4();
        let t0 = Utc::now() - Duration::seconds(10);

        store
            .ingest(SecurityEvent::new(
                tenant,
                "user-1",
                "password-changed",
                Utc::now(),
                None,
            ))
            .await
            .unwrap();

        assert!(store
            .latest_critical_event(Uuid::new_v4(), "user-1", t0)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .latest_critical_event(tenant, "user-2", t0)
            .await
            .unwrap()
            .is_none());
    }
}
