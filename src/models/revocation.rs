use chrono::{DateTime, Utc};

/// Denylist entry. Only the SHA-256 of the token is retained so the store
/// never persists a usable secret.
#[derive(Debug, Clone)]
pub struct RevokedTokenRecord {
    pub token_hash: String,
    pub revoked_at: DateTime<Utc>,
}
