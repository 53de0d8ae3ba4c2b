//! OAuth endpoint wire shapes (RFC 6749/7009/7662 style).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ClientType, OAuthClient, SubjectType};

/// Query parameters for `GET /oauth2/authorize`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
}

/// Form body for `POST /oauth2/token`, dispatched on `grant_type`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
}

impl TokenResponse {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        scope: &str,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in,
            scope: scope.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

/// RFC 7662-shaped introspection result. Everything but `active` is omitted
/// for inactive tokens.
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<SubjectType>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self {
            active: false,
            token_type: None,
            scope: None,
            client_id: None,
            sub: None,
            iss: None,
            aud: None,
            exp: None,
            iat: None,
            tenant_id: None,
            subject_type: None,
        }
    }
}

// ============================================================================
// Client registry administration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ClientCreateRequest {
    pub client_id: String,
    pub client_type: ClientType,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientUpdateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub client_id: String,
    pub tenant_id: Uuid,
    pub client_type: ClientType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    /// Present only on creation of a confidential client, and only once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl ClientResponse {
    pub fn from_client(client: OAuthClient, client_secret: Option<String>) -> Self {
        Self {
            client_id: client.client_id,
            tenant_id: client.tenant_id,
            client_type: client.client_type,
            name: client.name,
            description: client.description,
            redirect_uris: client.redirect_uris,
            allowed_scopes: client.allowed_scopes,
            client_secret,
        }
    }
}
