//! Outbound client for the directory service.
//!
//! The core never stores user credentials; password verification, user
//! lookup and provisioning are RPCs against the directory. Calls carry the
//! tenant header and the internal service-auth header, observe a 5-second
//! timeout, and are never retried inside a request.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::tenant::TENANT_HEADER;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: String,
}

/// Result of resolving an email across tenants.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryAccount {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    Conflict,

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// HTTP 401 from the directory maps to `InvalidCredentials`; any other
    /// non-2xx outcome is `Unavailable` and surfaces as `server_error`.
    async fn verify_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError>;

    /// Resolve an email to its home tenant and user.
    async fn discover_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DirectoryAccount>, DirectoryError>;

    /// Tenant-scoped user lookup.
    async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// SCIM provisioning. Implementations must not create duplicates when
    /// the user already exists under the tenant.
    async fn create_user(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpDirectoryClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct ScimListResponse {
    #[serde(rename = "totalResults", default)]
    total_results: u64,
}

#[derive(Debug, Deserialize)]
struct ScimUserResponse {
    id: Uuid,
    #[serde(rename = "userName")]
    user_name: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, auth_header: &str, auth_token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DIRECTORY_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: auth_header.to_string(),
            auth_token: auth_token.to_string(),
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        tenant_id: Option<Uuid>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(&self.auth_header, &self.auth_token);
        if let Some(tenant_id) = tenant_id {
            builder = builder.header(TENANT_HEADER, tenant_id.to_string());
        }
        builder
    }
}

fn transport(err: reqwest::Error) -> DirectoryError {
    DirectoryError::Unavailable(err.to_string())
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn verify_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError> {
        let response = self
            .request(
                reqwest::Method::POST,
                "/internal/credentials/verify",
                Some(tenant_id),
            )
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(DirectoryError::InvalidCredentials),
            status if status.is_success() => response.json().await.map_err(transport),
            status => Err(DirectoryError::Unavailable(format!(
                "credential verify returned {status}"
            ))),
        }
    }

    async fn discover_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DirectoryAccount>, DirectoryError> {
        let response = self
            .request(reqwest::Method::GET, "/internal/discover", None)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response.json().await.map(Some).map_err(transport),
            status => Err(DirectoryError::Unavailable(format!(
                "discover returned {status}"
            ))),
        }
    }

    async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let response = self
            .request(reqwest::Method::GET, "/users", Some(tenant_id))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response.json().await.map(Some).map_err(transport),
            status => Err(DirectoryError::Unavailable(format!(
                "user lookup returned {status}"
            ))),
        }
    }

    async fn create_user(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError> {
        // Guard against double provisioning: SCIM creates are not retried,
        // but the caller may be.
        let existing = self
            .request(reqwest::Method::GET, "/scim/v2/Users", Some(tenant_id))
            .query(&[("filter", format!("userName eq \"{email}\""))])
            .send()
            .await
            .map_err(transport)?;
        if existing.status().is_success() {
            let list: ScimListResponse = existing.json().await.map_err(transport)?;
            if list.total_results > 0 {
                return Err(DirectoryError::Conflict);
            }
        }

        let body = serde_json::json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": email,
            "password": password,
            "name": { "formatted": display_name.unwrap_or(email) },
            "active": true,
        });

        let response = self
            .request(reqwest::Method::POST, "/scim/v2/Users", Some(tenant_id))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::CONFLICT => Err(DirectoryError::Conflict),
            status if status.is_success() => {
                let created: ScimUserResponse = response.json().await.map_err(transport)?;
                Ok(DirectoryUser {
                    id: created.id,
                    email: created.user_name,
                })
            }
            status => Err(DirectoryError::Unavailable(format!(
                "SCIM create returned {status}"
            ))),
        }
    }
}
