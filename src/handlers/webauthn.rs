use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use webauthn_rs::prelude::{CreationChallengeResponse, RequestChallengeResponse};

use crate::config::AppState;
use crate::dto::mfa::MessageResponse;
use crate::dto::webauthn::{
    LoginBeginRequest, LoginFinishRequest, RegisterBeginRequest, RegisterFinishRequest,
    WebAuthnLoginResponse,
};
use crate::error::AuthError;
use crate::tenant::TenantContext;
use crate::utils::cookies;

/// POST /api/v1/mfa/webauthn/register/begin
pub async fn register_begin_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<RegisterBeginRequest>,
) -> Result<Json<CreationChallengeResponse>, AuthError> {
    let challenge = state
        .webauthn_service()
        .begin_registration(&ctx, request.user_id, &request.username)
        .await?;
    Ok(Json(challenge))
}

/// POST /api/v1/mfa/webauthn/register/finish
pub async fn register_finish_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<RegisterFinishRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state
        .webauthn_service()
        .finish_registration(&ctx, request.user_id, &request.credential)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "credential registered",
        }),
    ))
}

/// POST /api/v1/mfa/webauthn/login/begin
pub async fn login_begin_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<LoginBeginRequest>,
) -> Result<Json<RequestChallengeResponse>, AuthError> {
    let challenge = state
        .webauthn_service()
        .begin_login(&ctx, request.user_id)
        .await?;
    Ok(Json(challenge))
}

/// POST /api/v1/mfa/webauthn/login/finish
pub async fn login_finish_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<LoginFinishRequest>,
) -> Result<Response, AuthError> {
    let token = state
        .webauthn_service()
        .finish_login(&ctx, request.user_id, &request.credential)
        .await?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            cookies::access_cookie(&token, state.secure_cookies()),
        )]),
        Json(WebAuthnLoginResponse { token }),
    )
        .into_response())
}
