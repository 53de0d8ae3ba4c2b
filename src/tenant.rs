//! Tenant boundary resolution.
//!
//! Every transaction is pinned to the tenant named by the `X-Tenant-ID`
//! header at the request boundary. The identifier is immutable for the rest
//! of the call chain; stores filter on it and the orchestrator reports
//! cross-tenant access as `invalid_client` rather than a 404 so callers
//! cannot distinguish "does not exist" from "not yours".

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::AppState;
use crate::error::AuthError;

pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Strict 8-4-4-4-12 hex form. `Uuid::parse_str` also accepts braced and
/// URN forms, which the boundary rejects.
fn tenant_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("tenant id pattern")
    })
}

/// The tenant identity fixed for the lifetime of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }

    /// Parse a raw header value into a tenant context.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuthError::MissingTenant);
        }
        if !tenant_id_pattern().is_match(trimmed) {
            return Err(AuthError::InvalidTenant);
        }
        let tenant_id = Uuid::parse_str(trimmed).map_err(|_| AuthError::InvalidTenant)?;
        Ok(Self { tenant_id })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for TenantContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match parts.headers.get(TENANT_HEADER) {
            Some(value) => {
                let raw = value.to_str().map_err(|_| AuthError::InvalidTenant)?;
                TenantContext::parse(raw)
            }
            None => match state.config.default_tenant_id {
                Some(tenant_id) => Ok(TenantContext::new(tenant_id)),
                None => Err(AuthError::MissingTenant),
            },
        }
    }
}
