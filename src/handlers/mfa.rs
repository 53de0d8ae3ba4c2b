use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::config::AppState;
use crate::dto::mfa::{
    MessageResponse, TotpDeleteParams, TotpEnrollRequest, TotpEnrollResponse, TotpVerifyRequest,
};
use crate::error::AuthError;
use crate::tenant::TenantContext;

/// POST /api/v1/mfa/totp/enroll
pub async fn totp_enroll_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<TotpEnrollRequest>,
) -> Result<Json<TotpEnrollResponse>, AuthError> {
    let account_name = request
        .account_name
        .unwrap_or_else(|| request.user_id.to_string());
    let material = state
        .totp_service()
        .enroll(&ctx, request.user_id, &account_name)
        .await?;

    Ok(Json(TotpEnrollResponse {
        secret: material.secret_base32,
        qr_code: material.qr_code_png_base64,
        otpauth_url: material.otpauth_url,
    }))
}

/// POST /api/v1/mfa/totp/verify
pub async fn totp_verify_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<TotpVerifyRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .totp_service()
        .verify_enrollment(&ctx, request.user_id, &request.code)
        .await?;
    Ok(Json(MessageResponse {
        message: "TOTP enrollment verified",
    }))
}

/// DELETE /api/v1/mfa/totp?user_id=
pub async fn totp_delete_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(params): Query<TotpDeleteParams>,
) -> Result<StatusCode, AuthError> {
    state.totp_service().remove(&ctx, params.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
