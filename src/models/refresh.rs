use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Refresh tokens expire after seven days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// Who a token speaks for: an interactive user or a machine client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    User,
    Client,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(SubjectType::User),
            "client" => Some(SubjectType::Client),
            _ => None,
        }
    }
}

/// Server-side state for one refresh token. The raw token is the lookup key
/// and is not part of the record; stores index it hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub client_id: String,
    pub tenant_id: Uuid,
    pub scope: String,
    pub subject_type: SubjectType,
    pub subject_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(
        client_id: &str,
        tenant_id: Uuid,
        scope: &str,
        subject_type: SubjectType,
        subject_id: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            tenant_id,
            scope: scope.to_string(),
            subject_type,
            subject_id,
            expires_at: Utc::now() + Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The value minted into the `sub` claim on refresh.
    pub fn subject(&self) -> &str {
        self.subject_id.as_deref().unwrap_or(&self.client_id)
    }
}
