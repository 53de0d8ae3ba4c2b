//! Introspection: signature verification, refresh-token fallback, and the
//! Continuous Access Evaluation override.

mod common;

use axum::http::StatusCode;
use common::*;
use uuid::Uuid;

async fn introspect(app: &TestApp, tenant: &str, token: &str) -> serde_json::Value {
    let (status, _, body) = send(
        &app.router,
        json_request(
            "POST",
            "/oauth2/introspect",
            Some(tenant),
            &serde_json::json!({ "token": token }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn valid_access_token_introspects_with_full_claims() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let body = introspect(&app, TENANT, access_token).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "openid profile");
    assert_eq!(body["iss"], "identity-platform");
    assert_eq!(body["aud"], "client-app");
    assert_eq!(body["tenant_id"], TENANT);
    assert_eq!(body["subject_type"], "user");
    assert!(body["exp"].as_i64().is_some());
    assert!(body["iat"].as_i64().is_some());
}

#[tokio::test]
async fn unknown_tokens_are_inactive() {
    let app = spawn_app();
    let body = introspect(&app, TENANT, "not-a-token").await;
    assert_eq!(body, serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn refresh_tokens_introspect_via_the_store() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let refresh_token = pair["refresh_token"].as_str().unwrap();

    let body = introspect(&app, TENANT, refresh_token).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["token_type"], "refresh_token");
    assert_eq!(body["scope"], "openid profile");
    assert_eq!(body["client_id"], "test-client");
    assert_eq!(body["tenant_id"], TENANT);
    assert!(body["exp"].as_i64().is_some());
}

#[tokio::test]
async fn security_event_after_issuance_deactivates_the_token() {
    let app = spawn_app();
    let user_id = app
        .directory
        .add_user(app.tenant_id, "user@wardseal.com", "correct-horse");

    let (status, _, login) = send(
        &app.router,
        json_request(
            "POST",
            "/login",
            Some(TENANT),
            &serde_json::json!({
                "username": "user@wardseal.com",
                "password": "correct-horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap().to_string();

    assert_eq!(introspect(&app, TENANT, &token).await["active"], true);

    // A password change lands one second after issuance.
    let event_time = chrono::Utc::now() + chrono::Duration::seconds(1);
    let (status, _, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/signals/ingest",
            Some(TENANT),
            &serde_json::json!({
                "subject_id": user_id,
                "event_type": "password-changed",
                "event_time": event_time,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let body = introspect(&app, TENANT, &token).await;
    assert_eq!(body, serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn events_for_other_subjects_do_not_deactivate() {
    let app = spawn_app();
    app.directory
        .add_user(app.tenant_id, "user@wardseal.com", "correct-horse");

    let (_, _, login) = send(
        &app.router,
        json_request(
            "POST",
            "/login",
            Some(TENANT),
            &serde_json::json!({
                "username": "user@wardseal.com",
                "password": "correct-horse",
            }),
        ),
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/signals/ingest",
            Some(TENANT),
            &serde_json::json!({
                "subject_id": Uuid::new_v4(),
                "event_type": "password-changed",
                "event_time": chrono::Utc::now() + chrono::Duration::seconds(1),
            }),
        ),
    )
    .await;

    assert_eq!(introspect(&app, TENANT, &token).await["active"], true);
}

#[tokio::test]
async fn events_before_issuance_do_not_deactivate() {
    let app = spawn_app();
    let user_id = app
        .directory
        .add_user(app.tenant_id, "user@wardseal.com", "correct-horse");

    // The incident predates the login.
    send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/signals/ingest",
            Some(TENANT),
            &serde_json::json!({
                "subject_id": user_id,
                "event_type": "password-changed",
                "event_time": chrono::Utc::now() - chrono::Duration::minutes(5),
            }),
        ),
    )
    .await;

    let (_, _, login) = send(
        &app.router,
        json_request(
            "POST",
            "/login",
            Some(TENANT),
            &serde_json::json!({
                "username": "user@wardseal.com",
                "password": "correct-horse",
            }),
        ),
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    assert_eq!(introspect(&app, TENANT, &token).await["active"], true);
}

#[tokio::test]
async fn revoked_access_token_is_inactive_despite_valid_signature() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;
    let access_token = pair["access_token"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &app.router,
        json_request(
            "POST",
            "/oauth2/revoke",
            Some(TENANT),
            &serde_json::json!({ "token": access_token }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body = introspect(&app, TENANT, &access_token).await;
    assert_eq!(body, serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn tokens_do_not_introspect_across_tenants() {
    let app = spawn_app();
    register_public_client(&app, "test-client").await;
    let pair = obtain_token_pair(&app, "test-client").await;

    let other_tenant = Uuid::new_v4().to_string();
    for token in [
        pair["access_token"].as_str().unwrap(),
        pair["refresh_token"].as_str().unwrap(),
    ] {
        let body = introspect(&app, &other_tenant, token).await;
        assert_eq!(body["active"], false, "token leaked across tenants");
    }
}
