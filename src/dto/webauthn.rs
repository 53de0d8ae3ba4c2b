use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::{PublicKeyCredential, RegisterPublicKeyCredential};

#[derive(Debug, Deserialize)]
pub struct RegisterBeginRequest {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterFinishRequest {
    pub user_id: Uuid,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Deserialize)]
pub struct LoginBeginRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LoginFinishRequest {
    pub user_id: Uuid,
    pub credential: PublicKeyCredential,
}

#[derive(Debug, Serialize)]
pub struct WebAuthnLoginResponse {
    pub token: String,
}
