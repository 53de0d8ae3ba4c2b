//! OAuth grant machinery: authorization-code issuance with PKCE, the token
//! endpoint grants, introspection with the CAE override, and RFC 7009
//! revocation.
//!
//! Cross-tenant lookups resolve to `invalid_client` or `invalid_grant`; no
//! response distinguishes "not yours" from "does not exist".

use std::sync::Arc;
use uuid::Uuid;

use crate::dto::oauth::{
    AuthorizeParams, ClientCreateRequest, ClientUpdateRequest, IntrospectionResponse,
    TokenRequest, TokenResponse,
};
use crate::error::OAuthError;
use crate::keys::{KeyMaterial, ACCESS_TOKEN_TTL_SECS};
use crate::models::{AuthorizationCode, OAuthClient, RefreshTokenRecord, SubjectType};
use crate::stores::{ClientStore, CodeStore, RefreshStore, RevocationStore, SignalStore};
use crate::tenant::TenantContext;
use crate::utils::pkce::{
    validate_code_challenge, validate_code_verifier, verify_s256, PKCE_METHOD_S256,
};
use crate::utils::token::{
    generate_authorization_code, generate_client_secret, generate_refresh_token,
    hash_client_secret, verify_client_secret,
};

pub struct OAuthService {
    clients: Arc<dyn ClientStore>,
    codes: Arc<dyn CodeStore>,
    refresh: Arc<dyn RefreshStore>,
    revocation: Arc<dyn RevocationStore>,
    signals: Arc<dyn SignalStore>,
    keys: Arc<KeyMaterial>,
}

impl OAuthService {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        codes: Arc<dyn CodeStore>,
        refresh: Arc<dyn RefreshStore>,
        revocation: Arc<dyn RevocationStore>,
        signals: Arc<dyn SignalStore>,
        keys: Arc<KeyMaterial>,
    ) -> Self {
        Self {
            clients,
            codes,
            refresh,
            revocation,
            signals,
            keys,
        }
    }

    // ========================================================================
    // Authorization endpoint
    // ========================================================================

    /// Validate an authorization request, persist a PKCE-bound single-use
    /// code, and build the redirect URL. `session_subject` is the already
    /// authenticated session subject, when the browser carried one.
    pub async fn authorize(
        &self,
        ctx: &TenantContext,
        params: &AuthorizeParams,
        session_subject: Option<String>,
    ) -> Result<String, OAuthError> {
        if params.response_type != "code" {
            return Err(OAuthError::InvalidRequest(
                "response_type must be code".into(),
            ));
        }

        let client = self
            .clients
            .get(ctx.tenant_id, &params.client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if !client.has_redirect_uri(&params.redirect_uri) {
            return Err(OAuthError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            ));
        }

        let scope = params
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("scope is required".into()))?;
        if !client.allows_scope(scope) {
            return Err(OAuthError::InvalidScope(
                "requested scope exceeds the client allow-list".into(),
            ));
        }

        let challenge = params
            .code_challenge
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("code_challenge is required".into()))?;
        if !validate_code_challenge(challenge) {
            return Err(OAuthError::InvalidRequest(
                "code_challenge must be an unpadded base64url SHA-256 digest".into(),
            ));
        }
        let method = params.code_challenge_method.as_deref().unwrap_or(PKCE_METHOD_S256);
        if method != PKCE_METHOD_S256 {
            return Err(OAuthError::InvalidRequest(
                "code_challenge_method must be S256".into(),
            ));
        }

        let code = generate_authorization_code();
        self.codes
            .save(AuthorizationCode::new(
                code.clone(),
                &client.client_id,
                &params.redirect_uri,
                scope,
                ctx.tenant_id,
                challenge,
                session_subject,
            ))
            .await?;

        let separator = if params.redirect_uri.contains('?') { '&' } else { '?' };
        let mut location = format!(
            "{}{}code={}",
            params.redirect_uri,
            separator,
            urlencoding::encode(&code)
        );
        if let Some(state) = &params.state {
            location.push_str("&state=");
            location.push_str(&urlencoding::encode(state));
        }
        Ok(location)
    }

    // ========================================================================
    // Token endpoint
    // ========================================================================

    pub async fn token(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_str() {
            "authorization_code" => self.exchange_authorization_code(ctx, request).await,
            "client_credentials" => self.client_credentials(ctx, request).await,
            "refresh_token" => self.refresh_grant(ctx, request).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }

    async fn exchange_authorization_code(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let client_id = require(&request.client_id, "client_id")?;
        let code = require(&request.code, "code")?;
        let redirect_uri = require(&request.redirect_uri, "redirect_uri")?;
        let code_verifier = require(&request.code_verifier, "code_verifier")?;

        let client = self
            .clients
            .get(ctx.tenant_id, client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        // Confidential clients that present a secret must present the right
        // one; PKCE carries the proof for public clients.
        if let (Some(secret), Some(hash)) =
            (request.client_secret.as_deref(), client.client_secret_hash.as_deref())
        {
            if !verify_client_secret(secret, hash) {
                return Err(OAuthError::InvalidClient);
            }
        }

        if !client.has_redirect_uri(redirect_uri) {
            return Err(OAuthError::InvalidRedirectUri(
                "redirect_uri is not registered for this client".into(),
            ));
        }

        if !validate_code_verifier(code_verifier) {
            return Err(OAuthError::InvalidGrant(
                "invalid code_verifier format".into(),
            ));
        }

        // Consume first: the code must die even when verification below
        // fails, or a failed exchange would leave a replayable code.
        let consumed = self
            .codes
            .consume(code)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("invalid or expired authorization code".into()))?;

        if consumed.tenant_id != ctx.tenant_id
            || consumed.client_id != client.client_id
            || consumed.redirect_uri != redirect_uri
        {
            return Err(OAuthError::InvalidGrant(
                "authorization code was not issued to this client".into(),
            ));
        }

        if !verify_s256(code_verifier, &consumed.code_challenge) {
            return Err(OAuthError::InvalidGrant(
                "code_verifier does not match code_challenge".into(),
            ));
        }

        let subject = consumed
            .subject_id
            .clone()
            .unwrap_or_else(|| client.client_id.clone());
        self.issue_pair(
            ctx.tenant_id,
            &subject,
            SubjectType::User,
            &client.client_id,
            &consumed.scope,
        )
        .await
    }

    async fn client_credentials(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let client_id = require(&request.client_id, "client_id")?;
        let client_secret = require(&request.client_secret, "client_secret")?;

        let client = self
            .clients
            .get(ctx.tenant_id, client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        let secret_hash = client
            .client_secret_hash
            .as_deref()
            .ok_or(OAuthError::InvalidClient)?;
        if !client.is_confidential() || !verify_client_secret(client_secret, secret_hash) {
            return Err(OAuthError::InvalidClient);
        }

        let scope = match request.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => {
                if !client.allows_scope(requested) {
                    return Err(OAuthError::InvalidScope(
                        "requested scope exceeds the client allow-list".into(),
                    ));
                }
                requested.to_string()
            }
            // Empty request defaults to the full allow-list.
            None => client.allowed_scopes.join(" "),
        };

        let access_token = self
            .keys
            .mint(&client.client_id, SubjectType::Client, ctx.tenant_id, &scope)
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        // No refresh token for machine clients; they re-authenticate.
        Ok(TokenResponse::new(
            access_token,
            None,
            ACCESS_TOKEN_TTL_SECS,
            &scope,
        ))
    }

    async fn refresh_grant(
        &self,
        ctx: &TenantContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let token = require(&request.refresh_token, "refresh_token")?;

        if self.revocation.is_revoked(token).await? {
            return Err(OAuthError::InvalidGrant("token has been revoked".into()));
        }

        let stale = || OAuthError::InvalidGrant("invalid or expired refresh token".into());

        // Inspect before consuming so a cross-tenant guess cannot destroy
        // another tenant's token.
        let record = self.refresh.get(token).await?.ok_or_else(stale)?;
        if record.tenant_id != ctx.tenant_id {
            return Err(stale());
        }
        if record.is_expired(chrono::Utc::now()) {
            self.refresh.delete(token).await?;
            return Err(stale());
        }

        // Rotation: the consume is the witness; of two concurrent refreshes
        // exactly one proceeds. The old token is gone before the new one is
        // minted.
        let record = self.refresh.consume(token).await?.ok_or_else(stale)?;

        self.issue_pair(
            ctx.tenant_id,
            &record.subject().to_string(),
            record.subject_type,
            &record.client_id,
            &record.scope,
        )
        .await
    }

    async fn issue_pair(
        &self,
        tenant_id: Uuid,
        subject: &str,
        subject_type: SubjectType,
        client_id: &str,
        scope: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let access_token = self
            .keys
            .mint(subject, subject_type, tenant_id, scope)
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        let refresh_token = generate_refresh_token();
        let subject_id = match subject_type {
            SubjectType::User => Some(subject.to_string()),
            SubjectType::Client => None,
        };
        self.refresh
            .save(
                &refresh_token,
                RefreshTokenRecord::new(client_id, tenant_id, scope, subject_type, subject_id),
            )
            .await?;

        Ok(TokenResponse::new(
            access_token,
            Some(refresh_token),
            ACCESS_TOKEN_TTL_SECS,
            scope,
        ))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub async fn introspect(
        &self,
        ctx: &TenantContext,
        token: &str,
    ) -> Result<IntrospectionResponse, OAuthError> {
        if self.revocation.is_revoked(token).await? {
            return Ok(IntrospectionResponse::inactive());
        }

        match self.keys.verify(token) {
            Ok(claims) => {
                if claims.tenant != ctx.tenant_id.to_string() {
                    return Ok(IntrospectionResponse::inactive());
                }

                // CAE: a critical event after issuance kills the token even
                // though its signature still verifies. The check itself is
                // advisory and never fails the request.
                match self
                    .signals
                    .latest_critical_event(ctx.tenant_id, &claims.sub, claims.issued_at())
                    .await
                {
                    Ok(Some(event)) => {
                        tracing::info!(
                            sub = %claims.sub,
                            event_type = %event.event_type,
                            "token invalidated by security event"
                        );
                        return Ok(IntrospectionResponse::inactive());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "signal store unavailable during introspection");
                    }
                }

                Ok(IntrospectionResponse {
                    active: true,
                    token_type: Some("Bearer".into()),
                    scope: Some(claims.scope.clone()),
                    client_id: None,
                    sub: Some(claims.sub.clone()),
                    iss: Some(claims.iss.clone()),
                    aud: Some(claims.aud.clone()),
                    exp: Some(claims.exp),
                    iat: Some(claims.iat),
                    tenant_id: claims.tenant_id(),
                    subject_type: Some(claims.subject_type),
                })
            }
            // Not a JWT we signed: maybe an opaque refresh token.
            Err(_) => {
                let Some(record) = self.refresh.get(token).await? else {
                    return Ok(IntrospectionResponse::inactive());
                };
                if record.tenant_id != ctx.tenant_id || record.is_expired(chrono::Utc::now()) {
                    return Ok(IntrospectionResponse::inactive());
                }
                Ok(IntrospectionResponse {
                    active: true,
                    token_type: Some("refresh_token".into()),
                    scope: Some(record.scope.clone()),
                    client_id: Some(record.client_id.clone()),
                    sub: None,
                    iss: None,
                    aud: None,
                    exp: Some(record.expires_at.timestamp()),
                    iat: None,
                    tenant_id: Some(record.tenant_id),
                    subject_type: Some(record.subject_type),
                })
            }
        }
    }

    // ========================================================================
    // Revocation
    // ========================================================================

    /// RFC 7009: always succeeds, whether or not the token existed.
    pub async fn revoke(&self, ctx: &TenantContext, token: &str) -> Result<(), OAuthError> {
        self.revocation.revoke(token).await?;

        if let Some(record) = self.refresh.get(token).await? {
            if record.tenant_id == ctx.tenant_id {
                self.refresh.delete(token).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Client registry administration
    // ========================================================================

    /// Register a client. Confidential clients get a generated secret,
    /// returned exactly once.
    pub async fn register_client(
        &self,
        ctx: &TenantContext,
        request: ClientCreateRequest,
    ) -> Result<(OAuthClient, Option<String>), OAuthError> {
        if request.client_id.trim().is_empty() {
            return Err(OAuthError::InvalidRequest("client_id is required".into()));
        }
        if self
            .clients
            .get(ctx.tenant_id, &request.client_id)
            .await?
            .is_some()
        {
            return Err(OAuthError::InvalidRequest(
                "client_id is already registered".into(),
            ));
        }

        let (secret, secret_hash) = match request.client_type {
            crate::models::ClientType::Confidential => {
                let secret = generate_client_secret();
                let hash = hash_client_secret(&secret)
                    .map_err(|e| OAuthError::ServerError(e.to_string()))?;
                (Some(secret), Some(hash))
            }
            crate::models::ClientType::Public => (None, None),
        };

        let mut client = OAuthClient {
            client_id: request.client_id,
            tenant_id: ctx.tenant_id,
            client_type: request.client_type,
            name: request.name,
            description: request.description,
            redirect_uris: request.redirect_uris,
            allowed_scopes: request.allowed_scopes,
            client_secret_hash: secret_hash,
        };
        client.normalize();
        self.clients.create(client.clone()).await?;

        Ok((client, secret))
    }

    pub async fn get_client(
        &self,
        ctx: &TenantContext,
        client_id: &str,
    ) -> Result<OAuthClient, OAuthError> {
        self.clients
            .get(ctx.tenant_id, client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)
    }

    pub async fn list_clients(&self, ctx: &TenantContext) -> Result<Vec<OAuthClient>, OAuthError> {
        Ok(self.clients.list(ctx.tenant_id).await?)
    }

    pub async fn update_client(
        &self,
        ctx: &TenantContext,
        client_id: &str,
        request: ClientUpdateRequest,
    ) -> Result<OAuthClient, OAuthError> {
        let mut client = self.get_client(ctx, client_id).await?;
        client.name = request.name;
        client.description = request.description;
        client.redirect_uris = request.redirect_uris;
        client.allowed_scopes = request.allowed_scopes;
        client.normalize();

        if !self.clients.update(client.clone()).await? {
            return Err(OAuthError::InvalidClient);
        }
        Ok(client)
    }

    pub async fn delete_client(
        &self,
        ctx: &TenantContext,
        client_id: &str,
    ) -> Result<(), OAuthError> {
        if !self.clients.delete(ctx.tenant_id, client_id).await? {
            return Err(OAuthError::InvalidClient);
        }
        Ok(())
    }
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_support::shared_keys;
    use crate::stores::{
        InMemoryClientStore, InMemoryCodeStore, InMemoryRefreshStore, InMemoryRevocationStore,
        InMemorySignalStore,
    };
    use crate::utils::pkce::compute_s256_challenge;

    const VERIFIER: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNO1234567890abcd";

    fn service() -> OAuthService {
        OAuthService::new(
            Arc::new(InMemoryClientStore::new()),
            Arc::new(InMemoryCodeStore::new()),
            Arc::new(InMemoryRefreshStore::new()),
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(InMemorySignalStore::new()),
            shared_keys(),
        )
    }

    async fn seed_public_client(service: &OAuthService, ctx: &TenantContext) {
        service
            .register_client(
                ctx,
                ClientCreateRequest {
                    client_id: "test-client".into(),
                    client_type: crate::models::ClientType::Public,
                    name: "Test".into(),
                    description: None,
                    redirect_uris: vec!["https://app.example.com/callback".into()],
                    allowed_scopes: vec!["openid".into(), "profile".into()],
                },
            )
            .await
            .unwrap();
    }

    fn authorize_params(challenge: &str) -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".into(),
            client_id: "test-client".into(),
            redirect_uri: "https://app.example.com/callback".into(),
            scope: Some("openid profile".into()),
            code_challenge: Some(challenge.into()),
            code_challenge_method: Some("S256".into()),
            state: Some("xyz".into()),
        }
    }

    fn extract_code(location: &str) -> String {
        let (_, query) = location.split_once('?').unwrap();
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("code="))
            .map(|c| urlencoding::decode(c).unwrap().into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_client() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        let params = authorize_params(&compute_s256_challenge(VERIFIER));

        let err = service.authorize(&ctx, &params, None).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidClient));
    }

    #[tokio::test]
    async fn authorize_requires_code_challenge() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        seed_public_client(&service, &ctx).await;

        let mut params = authorize_params("unused");
        params.code_challenge = None;
        let err = service.authorize(&ctx, &params, None).await.unwrap_err();
        match err {
            OAuthError::InvalidRequest(desc) => {
                assert_eq!(desc, "code_challenge is required")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn authorize_is_tenant_isolated() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        seed_public_client(&service, &ctx).await;

        let foreign = TenantContext::new(Uuid::new_v4());
        let params = authorize_params(&compute_s256_challenge(VERIFIER));
        let err = service.authorize(&foreign, &params, None).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidClient));
    }

    #[tokio::test]
    async fn code_exchange_roundtrip_and_single_use() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        seed_public_client(&service, &ctx).await;

        let params = authorize_params(&compute_s256_challenge(VERIFIER));
        let location = service.authorize(&ctx, &params, None).await.unwrap();
        assert!(location.contains("state=xyz"));
        let code = extract_code(&location);

        let token_request = TokenRequest {
            grant_type: "authorization_code".into(),
            client_id: Some("test-client".into()),
            client_secret: None,
            code: Some(code.clone()),
            redirect_uri: Some("https://app.example.com/callback".into()),
            code_verifier: Some(VERIFIER.into()),
            refresh_token: None,
            scope: None,
        };
        let response = service.token(&ctx, &token_request).await.unwrap();
        assert_eq!(response.scope, "openid profile");
        assert!(response.refresh_token.is_some());

        // Second redemption of the same code fails.
        let err = service.token(&ctx, &token_request).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn wrong_verifier_is_invalid_grant_and_burns_the_code() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        seed_public_client(&service, &ctx).await;

        let params = authorize_params(&compute_s256_challenge(VERIFIER));
        let location = service.authorize(&ctx, &params, None).await.unwrap();
        let code = extract_code(&location);

        let mut token_request = TokenRequest {
            grant_type: "authorization_code".into(),
            client_id: Some("test-client".into()),
            client_secret: None,
            code: Some(code),
            redirect_uri: Some("https://app.example.com/callback".into()),
            code_verifier: Some("wrong-verifier-that-is-long-enough-to-be-valid".into()),
            refresh_token: None,
            scope: None,
        };
        let err = service.token(&ctx, &token_request).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));

        // Even the right verifier cannot resurrect it.
        token_request.code_verifier = Some(VERIFIER.into());
        let err = service.token(&ctx, &token_request).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn refresh_rotation_invalidates_the_old_token() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        seed_public_client(&service, &ctx).await;

        let pair = service
            .issue_pair(
                ctx.tenant_id,
                "user-1",
                SubjectType::User,
                "test-client",
                "openid",
            )
            .await
            .unwrap();
        let rt1 = pair.refresh_token.unwrap();

        let rotated = service
            .token(
                &ctx,
                &TokenRequest {
                    grant_type: "refresh_token".into(),
                    client_id: None,
                    client_secret: None,
                    code: None,
                    redirect_uri: None,
                    code_verifier: None,
                    refresh_token: Some(rt1.clone()),
                    scope: None,
                },
            )
            .await
            .unwrap();
        let rt2 = rotated.refresh_token.unwrap();
        assert_ne!(rt1, rt2);

        let err = service
            .token(
                &ctx,
                &TokenRequest {
                    grant_type: "refresh_token".into(),
                    client_id: None,
                    client_secret: None,
                    code: None,
                    redirect_uri: None,
                    code_verifier: None,
                    refresh_token: Some(rt1),
                    scope: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn unknown_grant_type_is_rejected() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        let err = service
            .token(
                &ctx,
                &TokenRequest {
                    grant_type: "password".into(),
                    client_id: None,
                    client_secret: None,
                    code: None,
                    redirect_uri: None,
                    code_verifier: None,
                    refresh_token: None,
                    scope: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::UnsupportedGrantType));
    }

    #[tokio::test]
    async fn revoked_token_introspects_inactive() {
        let service = service();
        let ctx = TenantContext::new(Uuid::new_v4());
        let token = service
            .keys
            .mint("user-1", SubjectType::User, ctx.tenant_id, "openid")
            .unwrap();

        assert!(service.introspect(&ctx, &token).await.unwrap().active);
        service.revoke(&ctx, &token).await.unwrap();
        service.revoke(&ctx, &token).await.unwrap(); // idempotent
        assert!(!service.introspect(&ctx, &token).await.unwrap().active);
    }
}
