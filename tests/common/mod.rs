//! Shared harness for the router-level suites: in-memory stores, a scripted
//! directory service, and request helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tower::ServiceExt;
use uuid::Uuid;

use wardseal_auth::app::create_router;
use wardseal_auth::config::{AppState, Config, Environment, Stores};
use wardseal_auth::keys::KeyMaterial;
use wardseal_auth::services::{
    DirectoryAccount, DirectoryClient, DirectoryError, DirectoryUser,
};

pub const TENANT: &str = "11111111-1111-1111-1111-111111111111";

/// One shared signing key per test binary; RSA generation is slow.
pub fn shared_keys() -> Arc<KeyMaterial> {
    static KEYS: OnceLock<Arc<KeyMaterial>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyMaterial::generate().expect("test signing key")))
        .clone()
}

// ============================================================================
// Scripted directory service
// ============================================================================

#[derive(Clone)]
struct MockUser {
    user_id: Uuid,
    password: String,
}

#[derive(Default)]
pub struct MockDirectory {
    users: Mutex<HashMap<(Uuid, String), MockUser>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, tenant_id: Uuid, username: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            (tenant_id, username.to_string()),
            MockUser {
                user_id,
                password: password.to_string(),
            },
        );
        user_id
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn verify_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError> {
        let users = self.users.lock().unwrap();
        match users.get(&(tenant_id, username.to_string())) {
            Some(user) if user.password == password => Ok(DirectoryUser {
                id: user.user_id,
                email: username.to_string(),
            }),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }

    async fn discover_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DirectoryAccount>, DirectoryError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|((_, name), _)| name == email)
            .map(|((tenant_id, _), user)| DirectoryAccount {
                user_id: user.user_id,
                tenant_id: *tenant_id,
            }))
    }

    async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .get(&(tenant_id, email.to_string()))
            .map(|user| DirectoryUser {
                id: user.user_id,
                email: email.to_string(),
            }))
    }

    async fn create_user(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        _display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError> {
        let mut users = self.users.lock().unwrap();
        let key = (tenant_id, email.to_string());
        if users.contains_key(&key) {
            return Err(DirectoryError::Conflict);
        }
        let user_id = Uuid::new_v4();
        users.insert(
            key,
            MockUser {
                user_id,
                password: password.to_string(),
            },
        );
        Ok(DirectoryUser {
            id: user_id,
            email: email.to_string(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub stores: Stores,
    pub directory: Arc<MockDirectory>,
    pub tenant_id: Uuid,
}

fn test_config() -> Config {
    Config {
        database_url: "mysql://unused".into(),
        server_host: "127.0.0.1".into(),
        server_port: 0,
        directory_service_url: "http://directory.invalid".into(),
        service_auth_token: "test-token".into(),
        service_auth_header: "X-Service-Token".into(),
        environment: Environment::Development,
        log_level: "warn".into(),
        otlp_endpoint: None,
        jwt_private_key_path: None,
        rp_id: "localhost".into(),
        rp_origin: "http://localhost:3000".into(),
        rp_name: "WardSeal".into(),
        totp_issuer: "WardSeal".into(),
        default_tenant_id: None,
        maintenance_interval_secs: 300,
    }
}

pub fn spawn_app() -> TestApp {
    let stores = Stores::in_memory();
    let directory = Arc::new(MockDirectory::new());

    let state = AppState::new(
        test_config(),
        shared_keys(),
        directory.clone(),
        stores.clone(),
        None,
    )
    .expect("app state");

    TestApp {
        router: create_router(state),
        stores,
        directory,
        tenant_id: Uuid::parse_str(TENANT).unwrap(),
    }
}

// ============================================================================
// Request helpers
// ============================================================================

pub async fn send(
    router: &Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = router.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, headers, json)
}

pub fn json_request(
    method: &str,
    uri: &str,
    tenant: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header("X-Tenant-ID", tenant);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn form_request(uri: &str, tenant: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(tenant) = tenant {
        builder = builder.header("X-Tenant-ID", tenant);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get_request(uri: &str, tenant: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header("X-Tenant-ID", tenant);
    }
    builder.body(Body::empty()).unwrap()
}

/// All `Set-Cookie` values on a response.
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

// ============================================================================
// OAuth helpers
// ============================================================================

pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const VERIFIER: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNO1234567890abcd";

pub fn s256_challenge(verifier: &str) -> String {
    wardseal_auth::utils::pkce::compute_s256_challenge(verifier)
}

/// Register a public client through the admin API.
pub async fn register_public_client(app: &TestApp, client_id: &str) {
    let (status, _, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/oauth/clients",
            Some(TENANT),
            &serde_json::json!({
                "client_id": client_id,
                "client_type": "public",
                "name": "Test App",
                "redirect_uris": [REDIRECT_URI],
                "allowed_scopes": ["openid", "profile"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

pub fn authorize_uri(client_id: &str, challenge: &str, state: &str) -> String {
    format!(
        "/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(client_id),
        urlencoding::encode(REDIRECT_URI),
        urlencoding::encode("openid profile"),
        urlencoding::encode(state),
        urlencoding::encode(challenge),
    )
}

pub fn code_from_location(location: &str) -> String {
    let (_, query) = location.split_once('?').expect("redirect query");
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("code="))
        .map(|code| urlencoding::decode(code).unwrap().into_owned())
        .expect("code parameter")
}

/// Full PKCE dance: authorize then exchange, returning the token response.
pub async fn obtain_token_pair(app: &TestApp, client_id: &str) -> serde_json::Value {
    let challenge = s256_challenge(VERIFIER);
    let (status, headers, _) = send(
        &app.router,
        get_request(&authorize_uri(client_id, &challenge, "xyz"), Some(TENANT)),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
    let location = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string();
    let code = code_from_location(&location);

    let (status, _, body) = send(
        &app.router,
        form_request(
            "/oauth2/token",
            Some(TENANT),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", VERIFIER),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "token exchange failed: {body}");
    body
}
