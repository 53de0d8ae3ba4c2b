use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeParams, IntrospectRequest, IntrospectionResponse, RevokeRequest, TokenRequest,
    TokenResponse,
};
use crate::error::OAuthError;
use crate::keys::JwksDocument;
use crate::tenant::TenantContext;
use crate::utils::cookies::{read_cookie, ACCESS_COOKIE};

/// The subject of an already-authenticated browser session, if the request
/// carried a valid access cookie. Authorization codes bind it so the token
/// exchange can mint for the real user.
fn session_subject(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = read_cookie(cookie_header, ACCESS_COOKIE)?;
    state.keys.verify(token).ok().map(|claims| claims.sub)
}

/// GET /oauth2/authorize
pub async fn authorize_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, OAuthError> {
    let subject = session_subject(&state, &headers);
    let location = state
        .oauth_service()
        .authorize(&ctx, &params, subject)
        .await?;

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// POST /oauth2/token (form-urlencoded)
pub async fn token_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let response = state.oauth_service().token(&ctx, &request).await?;
    Ok(Json(response))
}

/// POST /oauth2/introspect
pub async fn introspect_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<IntrospectRequest>,
) -> Result<Json<IntrospectionResponse>, OAuthError> {
    let response = state
        .oauth_service()
        .introspect(&ctx, &request.token)
        .await?;
    Ok(Json(response))
}

/// POST /oauth2/revoke
///
/// Always 200 on a well-formed request: the caller must not learn whether
/// the token existed.
pub async fn revoke_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<RevokeRequest>,
) -> Result<StatusCode, OAuthError> {
    state.oauth_service().revoke(&ctx, &request.token).await?;
    Ok(StatusCode::OK)
}

/// GET /.well-known/jwks.json
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwksDocument> {
    Json(state.keys.jwks().clone())
}
