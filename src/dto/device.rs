use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Device;

#[derive(Debug, Deserialize)]
pub struct DeviceRegisterRequest {
    pub user_id: Uuid,
    pub device_identifier: String,
    pub os: String,
    pub os_version: String,
    #[serde(default)]
    pub is_managed: bool,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub device_identifier: String,
    pub os: String,
    pub os_version: String,
    pub is_managed: bool,
    pub is_compliant: bool,
    pub risk_score: u8,
    pub last_seen_at: DateTime<Utc>,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            device_identifier: device.device_identifier,
            os: device.os,
            os_version: device.os_version,
            is_managed: device.is_managed,
            is_compliant: device.is_compliant,
            risk_score: device.risk_score,
            last_seen_at: device.last_seen_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostureUpdateRequest {
    pub is_compliant: bool,
    pub risk_score: u8,
}

#[derive(Debug, Deserialize)]
pub struct SignalIngestRequest {
    pub subject_id: String,
    pub event_type: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Producers may timestamp the event; ingestion time otherwise.
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
}
