use async_trait::async_trait;
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ClientType, OAuthClient};

/// Registry of OAuth clients, scoped to a tenant on every operation.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: Uuid,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, StoreError>;

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<OAuthClient>, StoreError>;

    async fn create(&self, client: OAuthClient) -> Result<(), StoreError>;

    /// Returns false when `(tenant_id, client_id)` does not exist.
    async fn update(&self, client: OAuthClient) -> Result<bool, StoreError>;

    async fn delete(&self, tenant_id: Uuid, client_id: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// MySQL
// ============================================================================

#[derive(Clone)]
pub struct MySqlClientStore {
    pool: MySqlPool,
}

impl MySqlClientStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::mysql::MySqlRow) -> Result<OAuthClient, StoreError> {
        let tenant_id: String = row.try_get("tenant_id").map_err(StoreError::from)?;
        let client_type: String = row.try_get("client_type").map_err(StoreError::from)?;
        let redirect_uris: String = row.try_get("redirect_uris").map_err(StoreError::from)?;
        let allowed_scopes: String = row.try_get("allowed_scopes").map_err(StoreError::from)?;

        Ok(OAuthClient {
            client_id: row.try_get("client_id").map_err(StoreError::from)?,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| StoreError::Unavailable(format!("bad tenant_id column: {e}")))?,
            client_type: ClientType::parse(&client_type)
                .ok_or_else(|| StoreError::Unavailable("bad client_type column".into()))?,
            name: row.try_get("name").map_err(StoreError::from)?,
            description: row.try_get("description").map_err(StoreError::from)?,
            redirect_uris: serde_json::from_str(&redirect_uris)
                .map_err(|e| StoreError::Unavailable(format!("bad redirect_uris column: {e}")))?,
            allowed_scopes: serde_json::from_str(&allowed_scopes)
                .map_err(|e| StoreError::Unavailable(format!("bad allowed_scopes column: {e}")))?,
            client_secret_hash: row.try_get("client_secret_hash").map_err(StoreError::from)?,
        })
    }
}

const CLIENT_COLUMNS: &str = "client_id, tenant_id, client_type, name, description, \
     redirect_uris, allowed_scopes, client_secret_hash";

#[async_trait]
impl ClientStore for MySqlClientStore {
    async fn get(
        &self,
        tenant_id: Uuid,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE tenant_id = ? AND client_id = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<OAuthClient>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE tenant_id = ? ORDER BY client_id"
        ))
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn create(&self, client: OAuthClient) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_clients
            (client_id, tenant_id, client_type, name, description,
             redirect_uris, allowed_scopes, client_secret_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.client_id)
        .bind(client.tenant_id.to_string())
        .bind(client.client_type.as_str())
        .bind(&client.name)
        .bind(&client.description)
        .bind(serde_json::to_string(&client.redirect_uris).unwrap_or_default())
        .bind(serde_json::to_string(&client.allowed_scopes).unwrap_or_default())
        .bind(&client.client_secret_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, client: OAuthClient) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET client_type = ?, name = ?, description = ?,
                redirect_uris = ?, allowed_scopes = ?, client_secret_hash = ?
            WHERE tenant_id = ? AND client_id = ?
            "#,
        )
        .bind(client.client_type.as_str())
        .bind(&client.name)
        .bind(&client.description)
        .bind(serde_json::to_string(&client.redirect_uris).unwrap_or_default())
        .bind(serde_json::to_string(&client.allowed_scopes).unwrap_or_default())
        .bind(&client.client_secret_hash)
        .bind(client.tenant_id.to_string())
        .bind(&client.client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, tenant_id: Uuid, client_id: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM oauth_clients WHERE tenant_id = ? AND client_id = ?")
                .bind(tenant_id.to_string())
                .bind(client_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<(Uuid, String), OAuthClient>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn get(
        &self,
        tenant_id: Uuid,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, StoreError> {
        let clients = self.clients.read().await;
        Ok(clients.get(&(tenant_id, client_id.to_string())).cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<OAuthClient>, StoreError> {
        let clients = self.clients.read().await;
        let mut out: Vec<OAuthClient> = clients
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(out)
    }

    async fn create(&self, client: OAuthClient) -> Result<(), StoreError> {
        let mut clients = self.clients.write().await;
        clients.insert((client.tenant_id, client.client_id.clone()), client);
        Ok(())
    }

    async fn update(&self, client: OAuthClient) -> Result<bool, StoreError> {
        let mut clients = self.clients.write().await;
        let key = (client.tenant_id, client.client_id.clone());
        if !clients.contains_key(&key) {
            return Ok(false);
        }
        clients.insert(key, client);
        Ok(true)
    }

    async fn delete(&self, tenant_id: Uuid, client_id: &str) -> Result<bool, StoreError> {
        let mut clients = self.clients.write().await;
        Ok(clients.remove(&(tenant_id, client_id.to_string())).is_some())
    }
}
