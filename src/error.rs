use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wire shape for every error the service emits: `{error, error_description}`,
/// with `locked_until` added for lockout responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl ErrorBody {
    pub fn new(error: &str, description: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description,
            locked_until: None,
        }
    }
}

/// Failures from the backing stores. `NotFound` is reserved for operations
/// that target a specific record; lookups use `Option` returns instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// RFC 6749-style errors for the OAuth endpoints.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidScope(String),

    #[error("{0}")]
    InvalidRedirectUri(String),

    #[error("Grant type not supported")]
    UnsupportedGrantType,

    #[error("Access denied")]
    AccessDenied,

    #[error("Internal server error")]
    ServerError(String),
}

impl OAuthError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::InvalidRedirectUri(_) => "invalid_redirect_uri",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::BAD_REQUEST,
            OAuthError::AccessDenied => StatusCode::FORBIDDEN,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::ServerError(detail) = &self {
            tracing::error!(%detail, "oauth request failed");
        }
        let description = match &self {
            // Never leak internals through the public body.
            OAuthError::ServerError(_) => None,
            other => Some(other.to_string()),
        };
        let body = ErrorBody::new(self.code(), description);
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        OAuthError::ServerError(err.to_string())
    }
}

/// Errors on the interactive authentication surface (login, MFA, signup,
/// device and signal ingestion).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("X-Tenant-ID header is required")]
    MissingTenant,

    #[error("X-Tenant-ID must be a UUID")]
    InvalidTenant,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("{0}")]
    AccessDenied(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingTenant => "missing_tenant",
            AuthError::InvalidTenant => "invalid_tenant",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::AccessDenied(_) => "access_denied",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::NotFound => "not_found",
            AuthError::Internal(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingTenant | AuthError::InvalidTenant | AuthError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(err) = &self {
            tracing::error!(error = %err, "request failed");
        }
        let mut body = ErrorBody::new(
            self.code(),
            match &self {
                AuthError::Internal(_) => None,
                other => Some(other.to_string()),
            },
        );
        if let AuthError::AccountLocked { locked_until } = &self {
            body.locked_until = Some(*locked_until);
        }
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(anyhow::anyhow!(err))
    }
}
