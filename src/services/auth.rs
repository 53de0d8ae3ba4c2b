//! The login orchestrator: lockout gate, directory credential verification,
//! risk evaluation, device upsert, and the TOTP gate, plus MFA completion,
//! signup and account lookup.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::auth::{LoginRequest, LookupResponse};
use crate::error::AuthError;
use crate::keys::KeyMaterial;
use crate::models::{Device, LoginAttempt, RefreshTokenRecord, SubjectType};
use crate::services::directory::{DirectoryClient, DirectoryError};
use crate::services::risk::{evaluate_risk, RiskLevel};
use crate::services::totp::TotpService;
use crate::stores::{
    DeviceStore, LoginAttemptStore, RefreshStore, SignalStore, WebAuthnStore,
};
use crate::tenant::TenantContext;
use crate::utils::token::generate_refresh_token;
use crate::utils::user_agent::os_version_from_user_agent;

/// Lockout policy: five failures inside the window lock the identity for
/// the lockout period. A successful login clears everything.
const MAX_FAILED_ATTEMPTS: u32 = 5;
const FAILURE_WINDOW_MINUTES: i64 = 15;
const LOCKOUT_MINUTES: i64 = 15;

/// Scope granted to interactive sessions.
const SESSION_SCOPE: &str = "openid profile";

/// Client identity recorded for session refresh tokens, which are minted by
/// the login flow rather than an OAuth client.
const SESSION_CLIENT_ID: &str = "wardseal-session";

#[derive(Debug)]
pub enum LoginOutcome {
    Success {
        access_token: String,
        refresh_token: String,
        user_id: Uuid,
    },
    MfaRequired {
        pending_token: String,
        user_id: Uuid,
    },
}

pub struct AuthService {
    directory: Arc<dyn DirectoryClient>,
    attempts: Arc<dyn LoginAttemptStore>,
    devices: Arc<dyn DeviceStore>,
    signals: Arc<dyn SignalStore>,
    refresh: Arc<dyn RefreshStore>,
    webauthn: Arc<dyn WebAuthnStore>,
    totp: TotpService,
    keys: Arc<KeyMaterial>,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        attempts: Arc<dyn LoginAttemptStore>,
        devices: Arc<dyn DeviceStore>,
        signals: Arc<dyn SignalStore>,
        refresh: Arc<dyn RefreshStore>,
        webauthn: Arc<dyn WebAuthnStore>,
        totp: TotpService,
        keys: Arc<KeyMaterial>,
    ) -> Self {
        Self {
            directory,
            attempts,
            devices,
            signals,
            refresh,
            webauthn,
            totp,
            keys,
        }
    }

    pub async fn login(
        &self,
        ctx: &TenantContext,
        request: &LoginRequest,
        ip: &str,
        user_agent: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        if let Some(locked_until) = self
            .attempts
            .is_locked(ctx.tenant_id, &request.username)
            .await?
        {
            return Err(AuthError::AccountLocked { locked_until });
        }

        let user = match self
            .directory
            .verify_credentials(ctx.tenant_id, &request.username, &request.password)
            .await
        {
            Ok(user) => user,
            Err(DirectoryError::InvalidCredentials) => {
                self.record_failure(ctx, request, ip).await?;
                return Err(AuthError::InvalidCredentials);
            }
            Err(other) => return Err(AuthError::Internal(anyhow::anyhow!(other))),
        };

        self.attempts
            .record_attempt(LoginAttempt::new(
                ctx.tenant_id,
                &request.username,
                ip,
                true,
            ))
            .await?;
        self.attempts.unlock(ctx.tenant_id, &request.username).await?;

        let risk = evaluate_risk(
            ctx.tenant_id,
            &user.id.to_string(),
            request.device_identifier.as_deref(),
            ip,
            self.devices.as_ref(),
            self.signals.as_ref(),
            Utc::now(),
        )
        .await;
        match risk.level {
            RiskLevel::High => {
                tracing::warn!(
                    user_id = %user.id,
                    score = risk.score,
                    factors = ?risk.factors,
                    "login denied by risk policy"
                );
                return Err(AuthError::AccessDenied("login denied by risk policy".into()));
            }
            RiskLevel::Medium => {
                tracing::info!(
                    user_id = %user.id,
                    score = risk.score,
                    factors = ?risk.factors,
                    "elevated login risk"
                );
            }
            RiskLevel::Low => {}
        }

        if let Some(identifier) = request.device_identifier.as_deref() {
            // Client-reported OS version outranks the parsed User-Agent.
            let os_version = request
                .os_version
                .clone()
                .or_else(|| user_agent.and_then(os_version_from_user_agent))
                .unwrap_or_else(|| "unknown".to_string());
            self.devices
                .register(Device::new(
                    ctx.tenant_id,
                    user.id,
                    identifier,
                    request.os.as_deref().unwrap_or("unknown"),
                    &os_version,
                    request.is_managed,
                ))
                .await?;
        }

        if self.totp.requires_mfa(ctx, user.id).await? {
            // The user is authenticated subject to MFA: the pending token
            // carries the identity but only becomes a session on completion.
            let pending_token = self
                .keys
                .mint(
                    &user.id.to_string(),
                    SubjectType::User,
                    ctx.tenant_id,
                    SESSION_SCOPE,
                )
                .map_err(AuthError::Internal)?;
            return Ok(LoginOutcome::MfaRequired {
                pending_token,
                user_id: user.id,
            });
        }

        let (access_token, refresh_token) = self.mint_session(ctx, user.id).await?;
        Ok(LoginOutcome::Success {
            access_token,
            refresh_token,
            user_id: user.id,
        })
    }

    async fn record_failure(
        &self,
        ctx: &TenantContext,
        request: &LoginRequest,
        ip: &str,
    ) -> Result<(), AuthError> {
        self.attempts
            .record_attempt(LoginAttempt::new(
                ctx.tenant_id,
                &request.username,
                ip,
                false,
            ))
            .await?;

        let failures = self
            .attempts
            .recent_failures(
                ctx.tenant_id,
                &request.username,
                Duration::minutes(FAILURE_WINDOW_MINUTES),
            )
            .await?;
        if failures >= MAX_FAILED_ATTEMPTS {
            let locked_until = Utc::now() + Duration::minutes(LOCKOUT_MINUTES);
            self.attempts
                .lock(ctx.tenant_id, &request.username, locked_until)
                .await?;
            tracing::warn!(
                username = %request.username,
                failures,
                %locked_until,
                "account locked after repeated failures"
            );
        }
        Ok(())
    }

    /// Validate the TOTP challenge and promote the pending token. The token
    /// minted at login already carries the identity; nothing new is minted.
    pub async fn complete_mfa(
        &self,
        ctx: &TenantContext,
        pending_token: &str,
        totp_code: &str,
        user_id: Uuid,
    ) -> Result<String, AuthError> {
        let claims = self.keys.verify(pending_token)?;
        if claims.sub != user_id.to_string() || claims.tenant != ctx.tenant_id.to_string() {
            return Err(AuthError::InvalidToken);
        }

        if !self.totp.verify_login(ctx, user_id, totp_code).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(pending_token.to_string())
    }

    /// Provision a brand-new tenant with its first user and log them in
    /// without re-entering the login pipeline.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        company_name: &str,
    ) -> Result<(Uuid, String, String), AuthError> {
        let tenant_id = Uuid::new_v4();
        let user = self
            .directory
            .create_user(tenant_id, email, password, Some(company_name))
            .await
            .map_err(|e| match e {
                DirectoryError::Conflict => {
                    AuthError::InvalidRequest("user already exists".into())
                }
                other => AuthError::Internal(anyhow::anyhow!(other)),
            })?;

        let ctx = TenantContext::new(tenant_id);
        let (access_token, refresh_token) = self.mint_session(&ctx, user.id).await?;
        Ok((tenant_id, access_token, refresh_token))
    }

    /// Resolve an email to its home tenant. The 404 is uniform: callers
    /// cannot distinguish "no such user" from any other miss.
    pub async fn lookup(&self, email: &str) -> Result<LookupResponse, AuthError> {
        let account = self
            .directory
            .discover_by_email(email)
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?
            .ok_or(AuthError::NotFound)?;

        let user = self
            .directory
            .find_by_email(account.tenant_id, email)
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?
            .ok_or(AuthError::NotFound)?;

        let webauthn_enabled = !self
            .webauthn
            .credentials_for_user(account.tenant_id, user.id)
            .await?
            .is_empty();

        Ok(LookupResponse {
            user_id: user.id,
            tenant_id: account.tenant_id,
            webauthn_enabled,
        })
    }

    async fn mint_session(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
    ) -> Result<(String, String), AuthError> {
        let access_token = self
            .keys
            .mint(
                &user_id.to_string(),
                SubjectType::User,
                ctx.tenant_id,
                SESSION_SCOPE,
            )
            .map_err(AuthError::Internal)?;

        let refresh_token = generate_refresh_token();
        self.refresh
            .save(
                &refresh_token,
                RefreshTokenRecord::new(
                    SESSION_CLIENT_ID,
                    ctx.tenant_id,
                    SESSION_SCOPE,
                    SubjectType::User,
                    Some(user_id.to_string()),
                ),
            )
            .await?;

        Ok((access_token, refresh_token))
    }
}
