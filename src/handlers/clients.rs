//! Tenant-scoped administration of the OAuth client registry.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::config::AppState;
use crate::dto::oauth::{ClientCreateRequest, ClientResponse, ClientUpdateRequest};
use crate::error::OAuthError;
use crate::tenant::TenantContext;

/// POST /api/v1/oauth/clients
///
/// The generated secret for a confidential client appears in this response
/// and nowhere else.
pub async fn create_client_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<ClientCreateRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), OAuthError> {
    let (client, secret) = state.oauth_service().register_client(&ctx, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ClientResponse::from_client(client, secret)),
    ))
}

/// GET /api/v1/oauth/clients
pub async fn list_clients_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<Vec<ClientResponse>>, OAuthError> {
    let clients = state.oauth_service().list_clients(&ctx).await?;
    Ok(Json(
        clients
            .into_iter()
            .map(|c| ClientResponse::from_client(c, None))
            .collect(),
    ))
}

/// GET /api/v1/oauth/clients/:client_id
pub async fn get_client_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<String>,
) -> Result<Json<ClientResponse>, OAuthError> {
    let client = state.oauth_service().get_client(&ctx, &client_id).await?;
    Ok(Json(ClientResponse::from_client(client, None)))
}

/// PUT /api/v1/oauth/clients/:client_id
pub async fn update_client_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<String>,
    Json(request): Json<ClientUpdateRequest>,
) -> Result<Json<ClientResponse>, OAuthError> {
    let client = state
        .oauth_service()
        .update_client(&ctx, &client_id, request)
        .await?;
    Ok(Json(ClientResponse::from_client(client, None)))
}

/// DELETE /api/v1/oauth/clients/:client_id
pub async fn delete_client_handler(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<String>,
) -> Result<StatusCode, OAuthError> {
    state.oauth_service().delete_client(&ctx, &client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
