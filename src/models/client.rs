use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a client can hold a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Public,
    Confidential,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(ClientType::Public),
            "confidential" => Some(ClientType::Confidential),
            _ => None,
        }
    }
}

/// A registered OAuth client, unique per `(tenant_id, client_id)`.
///
/// `client_secret_hash` is present iff the client is confidential; it holds
/// a bcrypt hash, never the plaintext secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub tenant_id: Uuid,
    pub client_type: ClientType,
    pub name: String,
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
}

impl OAuthClient {
    /// Trim and de-duplicate the allow-lists, preserving first-seen order.
    /// Applied on every write path.
    pub fn normalize(&mut self) {
        self.redirect_uris = dedup_trimmed(&self.redirect_uris);
        self.allowed_scopes = dedup_trimmed(&self.allowed_scopes);
    }

    /// Exact string match against the registered redirect URIs.
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// Every whitespace-delimited token of `requested` must be in the
    /// allow-list.
    pub fn allows_scope(&self, requested: &str) -> bool {
        requested
            .split_whitespace()
            .all(|s| self.allowed_scopes.iter().any(|a| a == s))
    }

    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }
}

fn dedup_trimmed(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}
