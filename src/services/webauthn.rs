//! WebAuthn registration and assertion ceremonies.
//!
//! Challenge generation and response validation are delegated to
//! `webauthn-rs`, bound to the relying party configured at startup. The
//! credential store keeps its own posture alongside: monotone sign
//! count with a sticky clone warning on regression. Registration uses the
//! `none` attestation policy, under which authenticators report a zeroed
//! AAGUID.
//!
//! Both ceremonies require an authenticated tenant context; there is no
//! fallback tenant.

use std::sync::Arc;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, CredentialID, Passkey, PasskeyAuthentication, PasskeyRegistration,
    PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse, Webauthn,
    WebauthnBuilder,
};

use crate::error::AuthError;
use crate::keys::KeyMaterial;
use crate::models::{SubjectType, WebAuthnCredential};
use crate::stores::{CeremonyKind, WebAuthnStore};
use crate::tenant::TenantContext;

/// Scope carried by tokens minted from a passkey login.
const WEBAUTHN_LOGIN_SCOPE: &str = "openid";

pub fn build_relying_party(
    rp_id: &str,
    rp_origin: &str,
    rp_name: &str,
) -> anyhow::Result<Webauthn> {
    let origin = Url::parse(rp_origin)?;
    let webauthn = WebauthnBuilder::new(rp_id, &origin)?
        .rp_name(rp_name)
        .build()?;
    Ok(webauthn)
}

pub struct WebAuthnService {
    webauthn: Arc<Webauthn>,
    store: Arc<dyn WebAuthnStore>,
    keys: Arc<KeyMaterial>,
}

impl WebAuthnService {
    pub fn new(
        webauthn: Arc<Webauthn>,
        store: Arc<dyn WebAuthnStore>,
        keys: Arc<KeyMaterial>,
    ) -> Self {
        Self {
            webauthn,
            store,
            keys,
        }
    }

    pub async fn begin_registration(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        username: &str,
    ) -> Result<CreationChallengeResponse, AuthError> {
        let existing = self
            .store
            .credentials_for_user(ctx.tenant_id, user_id)
            .await?;
        let exclude: Vec<CredentialID> = existing
            .iter()
            .map(|c| CredentialID::from(c.credential_id.clone()))
            .collect();

        let (challenge, state) = self
            .webauthn
            .start_passkey_registration(
                user_id,
                username,
                username,
                (!exclude.is_empty()).then_some(exclude),
            )
            .map_err(|e| AuthError::InvalidRequest(format!("registration rejected: {e}")))?;

        let state = serde_json::to_value(&state)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("ceremony state: {e}")))?;
        self.store
            .save_ceremony(ctx.tenant_id, user_id, CeremonyKind::Registration, state)
            .await?;

        Ok(challenge)
    }

    pub async fn finish_registration(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        response: &RegisterPublicKeyCredential,
    ) -> Result<(), AuthError> {
        let state = self
            .store
            .take_ceremony(ctx.tenant_id, user_id, CeremonyKind::Registration)
            .await?
            .ok_or(AuthError::InvalidRequest(
                "no registration in progress".into(),
            ))?;
        let state: PasskeyRegistration = serde_json::from_value(state)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("ceremony state: {e}")))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &state)
            .map_err(|e| AuthError::InvalidRequest(format!("attestation rejected: {e}")))?;

        let credential = WebAuthnCredential {
            credential_id: passkey.cred_id().as_ref().to_vec(),
            tenant_id: ctx.tenant_id,
            user_id,
            public_key: serde_json::to_vec(&passkey)
                .map_err(|e| AuthError::Internal(anyhow::anyhow!("credential encode: {e}")))?,
            attestation_type: "none".to_string(),
            aaguid: [0; 16],
            sign_count: 0,
            clone_warning: false,
            passkey: serde_json::to_value(&passkey)
                .map_err(|e| AuthError::Internal(anyhow::anyhow!("credential encode: {e}")))?,
        };
        self.store.insert_credential(credential).await?;

        Ok(())
    }

    pub async fn begin_login(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
    ) -> Result<RequestChallengeResponse, AuthError> {
        let credentials = self
            .store
            .credentials_for_user(ctx.tenant_id, user_id)
            .await?;
        if credentials.is_empty() {
            // Indistinguishable from a bad assertion later on.
            return Err(AuthError::InvalidCredentials);
        }

        let passkeys: Vec<Passkey> = credentials
            .iter()
            .map(|c| serde_json::from_value(c.passkey.clone()))
            .collect::<Result<_, _>>()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("stored credential: {e}")))?;

        let (challenge, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| AuthError::InvalidRequest(format!("assertion rejected: {e}")))?;

        let state = serde_json::to_value(&state)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("ceremony state: {e}")))?;
        self.store
            .save_ceremony(ctx.tenant_id, user_id, CeremonyKind::Authentication, state)
            .await?;

        Ok(challenge)
    }

    /// Validate the assertion, apply the sign-count rule, and mint an
    /// access token for the subject.
    pub async fn finish_login(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        response: &PublicKeyCredential,
    ) -> Result<String, AuthError> {
        let state = self
            .store
            .take_ceremony(ctx.tenant_id, user_id, CeremonyKind::Authentication)
            .await?
            .ok_or(AuthError::InvalidRequest("no login in progress".into()))?;
        let state: PasskeyAuthentication = serde_json::from_value(state)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("ceremony state: {e}")))?;

        let result = self
            .webauthn
            .finish_passkey_authentication(response, &state)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let warning = self
            .store
            .record_assertion(ctx.tenant_id, result.cred_id().as_ref(), result.counter())
            .await?;
        match warning {
            None => return Err(AuthError::InvalidCredentials),
            Some(true) => {
                tracing::warn!(
                    user_id = %user_id,
                    "sign count regression, credential flagged as possibly cloned"
                );
            }
            Some(false) => {}
        }

        self.keys
            .mint(
                &user_id.to_string(),
                SubjectType::User,
                ctx.tenant_id,
                WEBAUTHN_LOGIN_SCOPE,
            )
            .map_err(AuthError::Internal)
    }

    pub async fn has_credentials(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
    ) -> Result<bool, AuthError> {
        Ok(!self
            .store
            .credentials_for_user(ctx.tenant_id, user_id)
            .await?
            .is_empty())
    }
}
