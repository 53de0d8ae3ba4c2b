use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};

use crate::config::AppState;
use crate::dto::auth::{
    LoginRequest, LoginResponse, LookupRequest, LookupResponse, MfaCompleteRequest,
    MfaRequiredResponse, SignupRequest, SignupResponse,
};
use crate::dto::mfa::MessageResponse;
use crate::error::AuthError;
use crate::services::LoginOutcome;
use crate::tenant::TenantContext;
use crate::utils::cookies;

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

/// POST /login
pub async fn login_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let outcome = state
        .auth_service()
        .login(&ctx, &request, &client_ip(&headers), user_agent(&headers))
        .await?;

    match outcome {
        LoginOutcome::Success {
            access_token,
            refresh_token,
            ..
        } => {
            let secure = state.secure_cookies();
            Ok((
                AppendHeaders([
                    (header::SET_COOKIE, cookies::access_cookie(&access_token, secure)),
                    (
                        header::SET_COOKIE,
                        cookies::refresh_cookie(&refresh_token, secure),
                    ),
                ]),
                Json(LoginResponse {
                    token: access_token,
                }),
            )
                .into_response())
        }
        LoginOutcome::MfaRequired {
            pending_token,
            user_id,
        } => Ok(Json(MfaRequiredResponse {
            mfa_required: true,
            pending_token,
            user_id,
        })
        .into_response()),
    }
}

/// POST /login/mfa
///
/// Promotes the pending token into the session cookie; the token minted at
/// login already carries the identity.
pub async fn mfa_complete_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<MfaCompleteRequest>,
) -> Result<Response, AuthError> {
    let token = state
        .auth_service()
        .complete_mfa(&ctx, &request.pending_token, &request.totp_code, request.user_id)
        .await?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            cookies::access_cookie(&token, state.secure_cookies()),
        )]),
        Json(LoginResponse { token }),
    )
        .into_response())
}

/// POST /login/lookup
pub async fn lookup_handler(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, AuthError> {
    let found = state.auth_service().lookup(&request.email).await?;
    Ok(Json(found))
}

/// POST /logout
pub async fn logout_handler(State(state): State<AppState>) -> Response {
    let secure = state.secure_cookies();
    (
        AppendHeaders([
            (header::SET_COOKIE, cookies::clear_access_cookie(secure)),
            (header::SET_COOKIE, cookies::clear_refresh_cookie(secure)),
        ]),
        Json(MessageResponse {
            message: "logged out",
        }),
    )
        .into_response()
}

/// POST /api/v1/signup
pub async fn signup_handler(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, AuthError> {
    let (tenant_id, access_token, refresh_token) = state
        .auth_service()
        .signup(&request.email, &request.password, &request.company_name)
        .await?;

    let secure = state.secure_cookies();
    Ok((
        StatusCode::CREATED,
        AppendHeaders([
            (header::SET_COOKIE, cookies::access_cookie(&access_token, secure)),
            (
                header::SET_COOKIE,
                cookies::refresh_cookie(&refresh_token, secure),
            ),
        ]),
        Json(SignupResponse {
            token: access_token,
            tenant_id,
        }),
    )
        .into_response())
}
