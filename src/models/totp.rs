use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A TOTP enrollment for one identity.
///
/// Re-enrollment replaces `secret` and resets `verified`; only verified
/// enrollments gate login MFA.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub secret: Vec<u8>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl TotpEnrollment {
    pub fn new(tenant_id: Uuid, identity_id: Uuid, secret: Vec<u8>) -> Self {
        Self {
            identity_id,
            tenant_id,
            secret,
            verified: false,
            created_at: Utc::now(),
            verified_at: None,
        }
    }
}
