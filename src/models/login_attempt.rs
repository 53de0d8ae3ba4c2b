use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One login attempt against `(tenant, username)`.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub tenant_id: Uuid,
    pub username: String,
    pub ip: String,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn new(tenant_id: Uuid, username: &str, ip: &str, success: bool) -> Self {
        Self {
            tenant_id,
            username: username.to_string(),
            ip: ip.to_string(),
            success,
            attempted_at: Utc::now(),
        }
    }
}

