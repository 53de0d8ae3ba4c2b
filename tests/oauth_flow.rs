//! Router-level coverage of the authorization-code flow with PKCE, the
//! token grants, revocation and tenant isolation.

mod common;

use axum::http::{header, StatusCode};
use common::*;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use uuid::Uuid;

#[tokio::test]
async fn pkce_happy_path_issues_token_pair() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let challenge = s256_challenge(VERIFIER);
    let (status, headers, _) = send(
        &app.router,
        get_request(
            &authorize_uri("test-client", &challenge, "xyz"),
            Some(TENANT),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);

    let location = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(location.starts_with("https://app.example.com/callback?"));
    assert!(location.contains("state=xyz"));
    let code = code_from_location(location);
    assert!(!code.is_empty());

    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "test-client"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", VERIFIER),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "openid profile");
    assert_eq!(body["expires_in"], 3600);
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
}

#[tokio::test]
async fn issued_tokens_verify_under_published_jwks() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let (status, _, jwks) = send(&app.router, get_request("/.well-known/jwks.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    let jwk = &jwks["keys"][0];
    assert_eq!(jwk["kty"], "RSA");
    assert_eq!(jwk["alg"], "RS256");
    assert_eq!(jwk["use"], "sig");

    // The kid in the token header resolves in the JWKS.
    let token_header = jsonwebtoken::decode_header(access_token).unwrap();
    assert_eq!(token_header.kid.as_deref(), jwk["kid"].as_str());

    // And the published components verify the signature.
    let decoding =
        DecodingKey::from_rsa_components(jwk["n"].as_str().unwrap(), jwk["e"].as_str().unwrap())
            .unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["client-app"]);
    let decoded =
        jsonwebtoken::decode::<serde_json::Value>(access_token, &decoding, &validation).unwrap();
    assert_eq!(decoded.claims["iss"], "identity-platform");
    assert_eq!(decoded.claims["tenant"], TENANT);
    assert_eq!(decoded.claims["subject_type"], "user");
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let challenge = s256_challenge(VERIFIER);
    let (_, headers, _) = send(
        &app.router,
        get_request(
            &authorize_uri("test-client", &challenge, "xyz"),
            Some(TENANT),
        ),
    )
    .await;
    let code = code_from_location(headers[header::LOCATION].to_str().unwrap());

    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "test-client"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", "wrong-verifier-that-is-long-enough-to-be-valid"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn unknown_client_is_rejected_at_authorize() {
    let app = spawn_app();
    let challenge = s256_challenge(VERIFIER);

    let (status, _, body) = send(
        &app.router,
        get_request(
            &authorize_uri("unknown-client", &challenge, "xyz"),
            Some(TENANT),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn unregistered_redirect_uri_is_rejected() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let challenge = s256_challenge(VERIFIER);
    let uri = format!(
        "/oauth2/authorize?response_type=code&client_id=test-client&redirect_uri={}&scope=openid&state=xyz&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode("https://evil.example.com/callback"),
        urlencoding::encode(&challenge),
    );
    let (status, _, body) = send(&app.router, get_request(&uri, Some(TENANT))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(
        body["error_description"],
        "redirect_uri is not registered for this client"
    );
}

#[tokio::test]
async fn missing_code_challenge_is_rejected() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let uri = format!(
        "/oauth2/authorize?response_type=code&client_id=test-client&redirect_uri={}&scope=openid&state=xyz",
        urlencoding::encode(REDIRECT_URI),
    );
    let (status, _, body) = send(&app.router, get_request(&uri, Some(TENANT))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["error_description"], "code_challenge is required");
}

#[tokio::test]
async fn authorization_codes_are_single_use() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let challenge = s256_challenge(VERIFIER);
    let (_, headers, _) = send(
        &app.router,
        get_request(
            &authorize_uri("test-client", &challenge, "s"),
            Some(TENANT),
        ),
    )
    .await;
    let code = code_from_location(headers[header::LOCATION].to_str().unwrap());

    let exchange = |code: &str| {
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "test-client"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", VERIFIER),
            ],
        )
    };

    let (status, _, _) = send(&app.router, exchange(&code)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app.router, exchange(&code)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_rotation_retires_the_old_token() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let rt1 = pair["refresh_token"].as_str().unwrap().to_string();

    let (status, _, rotated) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[("grant_type", "refresh_token"), ("refresh_token", &rt1)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rt2 = rotated["refresh_token"].as_str().unwrap();
    assert_ne!(rt1, rt2);
    assert_eq!(rotated["scope"], "openid profile");

    // The submitted token is no longer acceptable.
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[("grant_type", "refresh_token"), ("refresh_token", &rt1)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn client_credentials_issues_access_token_only() {
    let app = spawn_app();

    let (status, _, created) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/oauth/clients",
            Some(TENANT),
            &serde_json::json!({
                "client_id": "machine-client",
                "client_type": "confidential",
                "name": "Machine",
                "redirect_uris": [],
                "allowed_scopes": ["service.read", "service.write"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let secret = created["client_secret"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "machine-client"),
                ("client_secret", &secret),
                ("scope", "service.read"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "service.read");
    assert!(body["access_token"].as_str().is_some());
    assert!(body.get("refresh_token").is_none());

    // Bad secret is a client authentication failure.
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "machine-client"),
                ("client_secret", "not-the-secret"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_client");

    // Scope outside the allow-list is refused.
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "machine-client"),
                ("client_secret", &secret),
                ("scope", "admin.all"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_scope");
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() {
    let app = spawn_app();
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[("grant_type", "password")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn revocation_is_idempotent_and_kills_refresh_tokens() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let rt = pair["refresh_token"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, _, _) = send(
            &app.router,
            json_request(
                "POST",
                "/oauth2/revoke",
                Some(TENANT),
                &serde_json::json!({ "token": rt }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // A revoked token no longer refreshes.
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[("grant_type", "refresh_token"), ("refresh_token", &rt)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");

    // Revoking garbage still returns 200.
    let (status, _, _) = send(
        &app.router,
        json_request(
            "POST",
            "/oauth2/revoke",
            Some(TENANT),
            &serde_json::json!({ "token": "never-issued" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn clients_are_invisible_across_tenants() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    let other_tenant = Uuid::new_v4().to_string();
    let challenge = s256_challenge(VERIFIER);
    let (status, _, body) = send(
        &app.router,
        get_request(
            &authorize_uri("test-client", &challenge, "xyz"),
            Some(&other_tenant),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_client");

    // Data-path reads miss rather than leak.
    let (status, _, _) = send(
        &app.router,
        get_request("/api/v1/oauth/clients/test-client", Some(&other_tenant)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tenant_header_is_required_and_validated() {
    let app = spawn_app();

    let (status, _, body) = send(
        &app.router,
        form_request("/oauth2/token", None, &[("grant_type", "refresh_token")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_tenant");

    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some("not-a-uuid"),
            &[("grant_type", "refresh_token")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tenant");
}

#[tokio::test]
async fn codes_do_not_cross_tenants_at_exchange() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;

    // A second tenant registers the same client id.
    let other_tenant = Uuid::new_v4().to_string();
    let (status, _, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/oauth/clients",
            Some(&other_tenant),
            &serde_json::json!({
                "client_id": "test-client",
                "client_type": "public",
                "name": "Shadow",
                "redirect_uris": [REDIRECT_URI],
                "allowed_scopes": ["openid", "profile"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let challenge = s256_challenge(VERIFIER);
    let (_, headers, _) = send(
        &app.router,
        get_request(
            &authorize_uri("test-client", &challenge, "xyz"),
            Some(TENANT),
        ),
    )
    .await;
    let code = code_from_location(headers[header::LOCATION].to_str().unwrap());

    // The other tenant cannot redeem a code minted under TENANT.
    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(&other_tenant),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "test-client"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", VERIFIER),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");
}
