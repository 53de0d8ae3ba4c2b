use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TotpEnrollRequest {
    pub user_id: Uuid,
    /// Account label shown in authenticator apps; falls back to the user id.
    #[serde(default)]
    pub account_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TotpEnrollResponse {
    pub secret: String,
    /// PNG, base64-encoded.
    pub qr_code: String,
    pub otpauth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct TotpVerifyRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TotpDeleteParams {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
