use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::WebAuthnCredential;

/// Ceremony state expires if the client never finishes.
const CEREMONY_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration",
            CeremonyKind::Authentication => "authentication",
        }
    }
}

/// WebAuthn credentials plus the transient between-step ceremony state.
///
/// `record_assertion` owns the counter rule: a reported sign count lower
/// than the stored one (and non-zero) marks the credential cloned and keeps
/// the stored maximum; otherwise the count advances.
#[async_trait]
pub trait WebAuthnStore: Send + Sync {
    async fn insert_credential(&self, credential: WebAuthnCredential) -> Result<(), StoreError>;

    async fn credentials_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, StoreError>;

    /// Returns the credential's clone-warning state after applying the
    /// counter, or `None` when the credential is unknown.
    async fn record_assertion(
        &self,
        tenant_id: Uuid,
        credential_id: &[u8],
        new_sign_count: u32,
    ) -> Result<Option<bool>, StoreError>;

    async fn save_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
        state: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// One-shot read: the state is removed whether or not the finish step
    /// succeeds afterwards.
    async fn take_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
    ) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Shared counter rule. Returns `(stored_count, clone_warning)` after the
/// assertion. Counter 0 means the authenticator does not count; it neither
/// advances nor warns.
fn apply_sign_count(stored: u32, warning: bool, reported: u32) -> (u32, bool) {
    if reported == 0 {
        (stored, warning)
    } else if reported <= stored && stored != 0 {
        (stored, true)
    } else {
        (reported, warning)
    }
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlWebAuthnStore {
    pool: MySqlPool,
}

impl MySqlWebAuthnStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::mysql::MySqlRow) -> Result<WebAuthnCredential, StoreError> {
        let tenant_id: String = row.try_get("tenant_id")?;
        let user_id: String = row.try_get("user_id")?;
        let aaguid: Vec<u8> = row.try_get("aaguid")?;
        let passkey: String = row.try_get("passkey")?;
        let sign_count: u32 = row.try_get("sign_count")?;

        Ok(WebAuthnCredential {
            credential_id: row.try_get("credential_id")?,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| StoreError::Unavailable(format!("bad tenant_id column: {e}")))?,
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| StoreError::Unavailable(format!("bad user_id column: {e}")))?,
            public_key: row.try_get("public_key")?,
            attestation_type: row.try_get("attestation_type")?,
            aaguid: aaguid
                .try_into()
                .map_err(|_| StoreError::Unavailable("bad aaguid column".into()))?,
            sign_count,
            clone_warning: row.try_get("clone_warning")?,
            passkey: serde_json::from_str(&passkey)
                .map_err(|e| StoreError::Unavailable(format!("bad passkey column: {e}")))?,
        })
    }
}

#[async_trait]
impl WebAuthnStore for MySqlWebAuthnStore {
    async fn insert_credential(&self, credential: WebAuthnCredential) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_credentials
            (tenant_id, credential_id, user_id, public_key, attestation_type,
             aaguid, sign_count, clone_warning, passkey)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(credential.tenant_id.to_string())
        .bind(&credential.credential_id)
        .bind(credential.user_id.to_string())
        .bind(&credential.public_key)
        .bind(&credential.attestation_type)
        .bind(credential.aaguid.to_vec())
        .bind(credential.sign_count)
        .bind(credential.clone_warning)
        .bind(
            serde_json::to_string(&credential.passkey)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn credentials_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, credential_id, user_id, public_key, attestation_type,
                   aaguid, sign_count, clone_warning, passkey
            FROM webauthn_credentials
            WHERE tenant_id = ? AND user_id = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn record_assertion(
        &self,
        tenant_id: Uuid,
        credential_id: &[u8],
        new_sign_count: u32,
    ) -> Result<Option<bool>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT sign_count, clone_warning FROM webauthn_credentials
            WHERE tenant_id = ? AND credential_id = ?
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let stored: u32 = row.try_get("sign_count")?;
        let warning: bool = row.try_get("clone_warning")?;
        let (count, warning) = apply_sign_count(stored, warning, new_sign_count);

        sqlx::query(
            r#"
            UPDATE webauthn_credentials
            SET sign_count = ?, clone_warning = ?
            WHERE tenant_id = ? AND credential_id = ?
            "#,
        )
        .bind(count)
        .bind(warning)
        .bind(tenant_id.to_string())
        .bind(credential_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(warning))
    }

    async fn save_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
        state: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_ceremonies (tenant_id, user_id, kind, state, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE state = VALUES(state), expires_at = VALUES(expires_at)
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(user_id.to_string())
        .bind(kind.as_str())
        .bind(serde_json::to_string(&state).map_err(|e| StoreError::Unavailable(e.to_string()))?)
        .bind(Utc::now() + Duration::seconds(CEREMONY_TTL_SECS))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT state, expires_at FROM webauthn_ceremonies
            WHERE tenant_id = ? AND user_id = ? AND kind = ?
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(user_id.to_string())
        .bind(kind.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "DELETE FROM webauthn_ceremonies WHERE tenant_id = ? AND user_id = ? AND kind = ?",
        )
        .bind(tenant_id.to_string())
        .bind(user_id.to_string())
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at < Utc::now() {
            return Ok(None);
        }
        let state: String = row.try_get("state")?;
        serde_json::from_str(&state)
            .map(Some)
            .map_err(|e| StoreError::Unavailable(format!("bad ceremony state: {e}")))
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebAuthnStore {
    credentials: RwLock<HashMap<(Uuid, Vec<u8>), WebAuthnCredential>>,
    ceremonies: RwLock<HashMap<(Uuid, Uuid, CeremonyKind), (serde_json::Value, DateTime<Utc>)>>,
}

impl InMemoryWebAuthnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebAuthnStore for InMemoryWebAuthnStore {
    async fn insert_credential(&self, credential: WebAuthnCredential) -> Result<(), StoreError> {
        self.credentials.write().await.insert(
            (credential.tenant_id, credential.credential_id.clone()),
            credential,
        );
        Ok(())
    }

    async fn credentials_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .await
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_assertion(
        &self,
        tenant_id: Uuid,
        credential_id: &[u8],
        new_sign_count: u32,
    ) -> Result<Option<bool>, StoreError> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&(tenant_id, credential_id.to_vec())) {
            Some(credential) => {
                let (count, warning) = apply_sign_count(
                    credential.sign_count,
                    credential.clone_warning,
                    new_sign_count,
                );
                credential.sign_count = count;
                credential.clone_warning = warning;
                Ok(Some(warning))
            }
            None => Ok(None),
        }
    }

    async fn save_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
        state: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.ceremonies.write().await.insert(
            (tenant_id, user_id, kind),
            (state, Utc::now() + Duration::seconds(CEREMONY_TTL_SECS)),
        );
        Ok(())
    }

    async fn take_ceremony(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: CeremonyKind,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let removed = self
            .ceremonies
            .write()
            .await
            .remove(&(tenant_id, user_id, kind));
        Ok(removed.and_then(|(state, expires_at)| (expires_at >= Utc::now()).then_some(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(tenant: Uuid, user: Uuid, id: &[u8], count: u32) -> WebAuthnCredential {
        WebAuthnCredential {
            credential_id: id.to_vec(),
            tenant_id: tenant,
            user_id: user,
            public_key: vec![0xAB; 32],
            attestation_type: "none".into(),
            aaguid: [0; 16],
            sign_count: count,
            clone_warning: false,
            passkey: serde_json::json!({}),
        }
    }

    #[test]
    fn sign_count_advances_monotonically() {
        assert_eq!(apply_sign_count(5, false, 6), (6, false));
        assert_eq!(apply_sign_count(5, false, 100), (100, false));
    }

    #[test]
    fn regression_sets_clone_warning_and_keeps_maximum() {
        assert_eq!(apply_sign_count(10, false, 7), (10, true));
        assert_eq!(apply_sign_count(10, false, 10), (10, true));
        // The warning is sticky.
        assert_eq!(apply_sign_count(10, true, 11), (11, true));
    }

    #[test]
    fn counterless_authenticators_never_warn() {
        assert_eq!(apply_sign_count(10, false, 0), (10, false));
        assert_eq!(apply_sign_count(0, false, 0), (0, false));
        // First real count from a fresh credential.
        assert_eq!(apply_sign_count(0, false, 1), (1, false));
    }

    #[tokio::test]
    async fn record_assertion_flags_regression() {
        let store = InMemoryWebAuthnStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        store
            .insert_credential(credential(tenant, user, b"cred-1", 5))
            .await
            .unwrap();

        assert_eq!(
            store.record_assertion(tenant, b"cred-1", 6).await.unwrap(),
            Some(false)
        );
        assert_eq!(
            store.record_assertion(tenant, b"cred-1", 3).await.unwrap(),
            Some(true)
        );

        let creds = store.credentials_for_user(tenant, user).await.unwrap();
        assert_eq!(creds[0].sign_count, 6);
        assert!(creds[0].clone_warning);
    }

    #[tokio::test]
    async fn assertion_against_unknown_credential_is_none() {
        let store = InMemoryWebAuthnStore::new();
        assert_eq!(
            store
                .record_assertion(Uuid::new_v4(), b"nope", 1)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn ceremony_state_is_one_shot() {
        let store = InMemoryWebAuthnStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        store
            .save_ceremony(
                tenant,
                user,
                CeremonyKind::Registration,
                serde_json::json!({"challenge": "abc"}),
            )
            .await
            .unwrap();

        assert!(store
            .take_ceremony(tenant, user, CeremonyKind::Registration)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .take_ceremony(tenant, user, CeremonyKind::Registration)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn ceremony_kinds_do_not_collide() {
        let store = InMemoryWebAuthnStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        store
            .save_ceremony(
                tenant,
                user,
                CeremonyKind::Authentication,
                serde_json::json!(1),
            )
            .await
            .unwrap();
        assert!(store
            .take_ceremony(tenant, user, CeremonyKind::Registration)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .take_ceremony(tenant, user, CeremonyKind::Authentication)
            .await
            .unwrap()
            .is_some());
    }
}
