use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A device posture record, unique per `(tenant_id, device_identifier)`.
/// Re-registration refreshes `last_seen_at` and the mutable posture fields.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub device_identifier: String,
    pub os: String,
    pub os_version: String,
    pub is_managed: bool,
    pub is_compliant: bool,
    pub risk_score: u8,
    pub last_seen_at: DateTime<Utc>,
}

impl Device {
    pub fn new(
        tenant_id: Uuid,
        user_id: Uuid,
        device_identifier: &str,
        os: &str,
        os_version: &str,
        is_managed: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            device_identifier: device_identifier.to_string(),
            os: os.to_string(),
            os_version: os_version.to_string(),
            is_managed,
            // New devices start compliant with no reported risk until the
            // posture agent says otherwise.
            is_compliant: true,
            risk_score: 0,
            last_seen_at: Utc::now(),
        }
    }
}

/// Append-only security event used for risk scoring and CAE.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub reason: Option<String>,
}

impl SecurityEvent {
    pub fn new(
        tenant_id: Uuid,
        subject_id: &str,
        event_type: &str,
        event_time: DateTime<Utc>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            subject_id: subject_id.to_string(),
            event_type: event_type.to_string(),
            event_time,
            reason,
        }
    }
}
