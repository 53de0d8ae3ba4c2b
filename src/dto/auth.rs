//! Request/response bodies for the interactive login surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Optional device posture hints from managed clients. The OS version
    /// hint wins over anything parsed from the User-Agent header.
    pub device_identifier: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    #[serde(default)]
    pub is_managed: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MfaRequiredResponse {
    pub mfa_required: bool,
    pub pending_token: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MfaCompleteRequest {
    pub pending_token: String,
    pub totp_code: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub webauthn_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub company_name: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub token: String,
    pub tenant_id: Uuid,
}
