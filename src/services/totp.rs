//! TOTP enrollment and verification.
//!
//! Standard parameters: SHA-1, 6 digits, 30-second step, one step of clock
//! skew either way. Enrollment produces the shared secret, an `otpauth://`
//! URL and a QR code; the enrollment only gates login MFA once a first code
//! has been verified.

use chrono::Utc;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::TotpEnrollment;
use crate::stores::TotpStore;
use crate::tenant::TenantContext;

pub struct TotpEnrollmentMaterial {
    pub secret_base32: String,
    pub otpauth_url: String,
    pub qr_code_png_base64: String,
}

pub struct TotpService {
    store: Arc<dyn TotpStore>,
    issuer: String,
}

impl TotpService {
    pub fn new(store: Arc<dyn TotpStore>, issuer: String) -> Self {
        Self { store, issuer }
    }

    fn totp(&self, secret: Vec<u8>, account_name: String) -> Result<TOTP, AuthError> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(self.issuer.clone()),
            account_name,
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("TOTP construction failed: {e}")))
    }

    /// Create (or replace) the enrollment for an identity. A replaced
    /// enrollment is unverified until a fresh code is confirmed.
    pub async fn enroll(
        &self,
        ctx: &TenantContext,
        identity_id: Uuid,
        account_name: &str,
    ) -> Result<TotpEnrollmentMaterial, AuthError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("secret generation failed: {e:?}")))?;

        self.store
            .upsert(TotpEnrollment::new(
                ctx.tenant_id,
                identity_id,
                secret_bytes.clone(),
            ))
            .await?;

        let totp = self.totp(secret_bytes, account_name.to_string())?;
        let qr_code_png_base64 = totp
            .get_qr_base64()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("QR generation failed: {e}")))?;

        let secret_base32 = match secret.to_encoded() {
            Secret::Encoded(encoded) => encoded,
            Secret::Raw(_) => unreachable!("to_encoded returns the encoded variant"),
        };

        Ok(TotpEnrollmentMaterial {
            secret_base32,
            otpauth_url: totp.get_url(),
            qr_code_png_base64,
        })
    }

    /// Confirm an enrollment with a first code. The first success flips the
    /// enrollment to verified.
    pub async fn verify_enrollment(
        &self,
        ctx: &TenantContext,
        identity_id: Uuid,
        code: &str,
    ) -> Result<(), AuthError> {
        let enrollment = self
            .store
            .get(ctx.tenant_id, identity_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !self.check_code(&enrollment, code)? {
            return Err(AuthError::InvalidRequest("invalid TOTP code".into()));
        }

        if !enrollment.verified {
            self.store
                .mark_verified(ctx.tenant_id, identity_id, Utc::now())
                .await?;
        }
        Ok(())
    }

    /// Validate a login challenge. Only verified enrollments count.
    pub async fn verify_login(
        &self,
        ctx: &TenantContext,
        identity_id: Uuid,
        code: &str,
    ) -> Result<bool, AuthError> {
        let Some(enrollment) = self.store.get(ctx.tenant_id, identity_id).await? else {
            return Ok(false);
        };
        if !enrollment.verified {
            return Ok(false);
        }
        self.check_code(&enrollment, code)
    }

    /// Whether login must demand a TOTP challenge for this identity.
    pub async fn requires_mfa(
        &self,
        ctx: &TenantContext,
        identity_id: Uuid,
    ) -> Result<bool, AuthError> {
        Ok(self
            .store
            .get(ctx.tenant_id, identity_id)
            .await?
            .map(|e| e.verified)
            .unwrap_or(false))
    }

    pub async fn remove(&self, ctx: &TenantContext, identity_id: Uuid) -> Result<(), AuthError> {
        if !self.store.delete(ctx.tenant_id, identity_id).await? {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    fn check_code(&self, enrollment: &TotpEnrollment, code: &str) -> Result<bool, AuthError> {
        let totp = self.totp(
            enrollment.secret.clone(),
            enrollment.identity_id.to_string(),
        )?;
        totp.check_current(code)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("clock error: {e}")))
    }
}
