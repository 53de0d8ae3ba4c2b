//! Router assembly.

use axum::{
    http::{header, Method, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppState;
use crate::handlers::{
    auth::{
        login_handler, logout_handler, lookup_handler, mfa_complete_handler, signup_handler,
    },
    clients::{
        create_client_handler, delete_client_handler, get_client_handler, list_clients_handler,
        update_client_handler,
    },
    device::{ingest_signal_handler, register_device_handler, update_posture_handler},
    mfa::{totp_delete_handler, totp_enroll_handler, totp_verify_handler},
    oauth::{
        authorize_handler, introspect_handler, jwks_handler, revoke_handler, token_handler,
    },
    webauthn::{
        login_begin_handler, login_finish_handler, register_begin_handler,
        register_finish_handler,
    },
};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: verifies the database connection when one is configured.
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    if let Some(pool) = &state.pool {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    }
    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full application router.
///
/// Every route except signup, lookup, logout, JWKS and the health probes
/// resolves its tenant from the `X-Tenant-ID` header.
pub fn create_router(state: AppState) -> Router {
    let login_routes = Router::new()
        .route("/login", post(login_handler))
        .route("/login/mfa", post(mfa_complete_handler))
        .route("/login/lookup", post(lookup_handler))
        .route("/logout", post(logout_handler));

    let oauth_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/token", post(token_handler))
        .route("/introspect", post(introspect_handler))
        .route("/revoke", post(revoke_handler));

    let api_routes = Router::new()
        .route("/signup", post(signup_handler))
        // Client registry administration
        .route(
            "/oauth/clients",
            get(list_clients_handler).post(create_client_handler),
        )
        .route("/oauth/clients/:client_id", get(get_client_handler))
        .route("/oauth/clients/:client_id", put(update_client_handler))
        .route("/oauth/clients/:client_id", delete(delete_client_handler))
        // TOTP lifecycle
        .route("/mfa/totp/enroll", post(totp_enroll_handler))
        .route("/mfa/totp/verify", post(totp_verify_handler))
        .route("/mfa/totp", delete(totp_delete_handler))
        // WebAuthn ceremonies
        .route("/mfa/webauthn/register/begin", post(register_begin_handler))
        .route("/mfa/webauthn/register/finish", post(register_finish_handler))
        .route("/mfa/webauthn/login/begin", post(login_begin_handler))
        .route("/mfa/webauthn/login/finish", post(login_finish_handler))
        // Device posture and security signals
        .route("/devices/register", post(register_device_handler))
        .route("/devices/:id/posture", post(update_posture_handler))
        .route("/signals/ingest", post(ingest_signal_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .merge(login_routes)
        .nest("/oauth2", oauth_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::HeaderName::from_static("x-tenant-id"),
                ])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}
