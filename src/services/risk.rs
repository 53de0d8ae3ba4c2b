//! Login risk evaluation.
//!
//! A pure function over the device and signal stores: it reads, sums, and
//! never mutates. A `HIGH` result denies the login; `MEDIUM` is advisory.
//! Store failures surface as scored factors rather than errors, so a broken
//! posture backend degrades the score instead of breaking login.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::stores::{DeviceStore, SignalStore};

const MAX_SCORE: u32 = 100;

/// Security events older than this no longer contribute.
const RECENT_EVENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_score(score: u8) -> Self {
        match score {
            0..=39 => RiskLevel::Low,
            40..=79 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

impl RiskAssessment {
    pub fn is_high(&self) -> bool {
        self.level == RiskLevel::High
    }
}

/// Score a login attempt from device posture and recent security events.
pub async fn evaluate_risk(
    tenant_id: Uuid,
    subject_id: &str,
    device_identifier: Option<&str>,
    ip: &str,
    devices: &dyn DeviceStore,
    signals: &dyn SignalStore,
    now: DateTime<Utc>,
) -> RiskAssessment {
    let mut score: u32 = 0;
    let mut factors = Vec::new();

    match device_identifier {
        None => {
            score += 10;
            factors.push("no_device_id".to_string());
        }
        Some(identifier) => match devices.get_by_identifier(tenant_id, identifier).await {
            Err(err) => {
                tracing::warn!(error = %err, "device lookup failed during risk evaluation");
                score += 20;
                factors.push("device_lookup_error".to_string());
            }
            Ok(None) => {
                score += 20;
                factors.push("unknown_device".to_string());
            }
            Ok(Some(device)) => {
                if !device.is_compliant {
                    score += 50;
                    factors.push("device_non_compliant".to_string());
                }
                if device.risk_score > 0 {
                    score += u32::from(device.risk_score);
                    factors.push("device_reported_risk".to_string());
                }
            }
        },
    }

    let since = now - Duration::hours(RECENT_EVENT_WINDOW_HOURS);
    match signals.latest_critical_event(tenant_id, subject_id, since).await {
        Ok(Some(event)) => {
            score += 30;
            factors.push(format!("recent_security_event:{}", event.event_type));
        }
        Ok(None) => {}
        Err(err) => {
            // Fail open on the signal side; the device factors still apply.
            tracing::warn!(error = %err, "signal lookup failed during risk evaluation");
        }
    }

    let score = score.min(MAX_SCORE) as u8;
    let assessment = RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        factors,
    };
    tracing::debug!(
        subject_id,
        ip,
        score = assessment.score,
        level = ?assessment.level,
        "risk evaluated"
    );
    assessment
}
