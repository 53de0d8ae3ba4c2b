use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::device::{
    DeviceRegisterRequest, DeviceResponse, PostureUpdateRequest, SignalIngestRequest,
};
use crate::dto::mfa::MessageResponse;
use crate::error::AuthError;
use crate::models::{Device, SecurityEvent};
use crate::tenant::TenantContext;

/// POST /api/v1/devices/register
pub async fn register_device_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<DeviceRegisterRequest>,
) -> Result<Json<DeviceResponse>, AuthError> {
    let device = state
        .stores
        .devices
        .register(Device::new(
            ctx.tenant_id,
            request.user_id,
            &request.device_identifier,
            &request.os,
            &request.os_version,
            request.is_managed,
        ))
        .await?;

    Ok(Json(device.into()))
}

/// POST /api/v1/devices/:id/posture
pub async fn update_posture_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(request): Json<PostureUpdateRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    if request.risk_score > 100 {
        return Err(AuthError::InvalidRequest(
            "risk_score must be between 0 and 100".into(),
        ));
    }

    let updated = state
        .stores
        .devices
        .update_posture(ctx.tenant_id, id, request.is_compliant, request.risk_score)
        .await?;
    if !updated {
        return Err(AuthError::NotFound);
    }

    Ok(Json(MessageResponse {
        message: "posture updated",
    }))
}

/// POST /api/v1/signals/ingest
pub async fn ingest_signal_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<SignalIngestRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state
        .stores
        .signals
        .ingest(SecurityEvent::new(
            ctx.tenant_id,
            &request.subject_id,
            &request.event_type,
            request.event_time.unwrap_or_else(Utc::now),
            request.reason,
        ))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "event recorded",
        }),
    ))
}
