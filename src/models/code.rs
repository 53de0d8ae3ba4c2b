use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authorization codes are single-use and expire after five minutes.
pub const CODE_TTL_SECS: i64 = 300;

/// A pending authorization code with its PKCE binding.
///
/// Created by `/oauth2/authorize`, consumed exactly once by `/oauth2/token`.
/// `subject_id` is the authenticated session subject captured at authorize
/// time, when one was present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub tenant_id: Uuid,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub subject_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: String,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        tenant_id: Uuid,
        code_challenge: &str,
        subject_id: Option<String>,
    ) -> Self {
        Self {
            code,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            tenant_id,
            code_challenge: code_challenge.to_string(),
            code_challenge_method: "S256".to_string(),
            subject_id,
            expires_at: Utc::now() + Duration::seconds(CODE_TTL_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
