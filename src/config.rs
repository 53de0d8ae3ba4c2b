use sqlx::MySqlPool;
use std::sync::Arc;
use uuid::Uuid;
use webauthn_rs::prelude::Webauthn;

use crate::keys::KeyMaterial;
use crate::services::directory::DirectoryClient;
use crate::services::webauthn::build_relying_party;
use crate::services::{AuthService, OAuthService, TotpService, WebAuthnService};
use crate::stores::{
    ClientStore, CodeStore, DeviceStore, InMemoryClientStore, InMemoryCodeStore,
    InMemoryDeviceStore, InMemoryLoginAttemptStore, InMemoryRefreshStore,
    InMemoryRevocationStore, InMemorySignalStore, InMemoryTotpStore, InMemoryWebAuthnStore,
    LoginAttemptStore, MySqlClientStore, MySqlCodeStore, MySqlDeviceStore,
    MySqlLoginAttemptStore, MySqlRefreshStore, MySqlRevocationStore, MySqlSignalStore,
    MySqlTotpStore, MySqlWebAuthnStore, RefreshStore, RevocationStore, SignalStore, TotpStore,
    WebAuthnStore,
};

/// Deployment environment; production turns on the `Secure` cookie flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Configuration loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,

    pub directory_service_url: String,
    pub service_auth_token: String,
    pub service_auth_header: String,

    pub environment: Environment,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,

    /// PEM file with the signing key; generated per process when unset.
    pub jwt_private_key_path: Option<String>,

    // WebAuthn relying party identity.
    pub rp_id: String,
    pub rp_origin: String,
    pub rp_name: String,

    pub totp_issuer: String,

    /// Optional fallback when `X-Tenant-ID` is absent.
    pub default_tenant_id: Option<Uuid>,

    pub maintenance_interval_secs: u64,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "mysql://{}:{}@{}:{}/{}",
                env_or("DB_USER", "wardseal"),
                env_or("DB_PASSWORD", "wardseal"),
                env_or("DB_HOST", "localhost"),
                env_or("DB_PORT", "3306"),
                env_or("DB_NAME", "wardseal_auth"),
            )
        });

        let default_tenant_id = match std::env::var("DEFAULT_TENANT_ID") {
            Ok(raw) => Some(Uuid::parse_str(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_or("SERVER_PORT", "3000").parse()?,
            directory_service_url: env_or("DIRECTORY_SERVICE_URL", "http://localhost:8080"),
            service_auth_token: env_or("SERVICE_AUTH_TOKEN", ""),
            service_auth_header: env_or("SERVICE_AUTH_HEADER", "X-Service-Token"),
            environment: Environment::from_str(&env_or("ENVIRONMENT", "development")),
            log_level: env_or("LOG_LEVEL", "info"),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            jwt_private_key_path: std::env::var("JWT_PRIVATE_KEY_PATH").ok(),
            rp_id: env_or("RP_ID", "localhost"),
            rp_origin: env_or("RP_ORIGIN", "http://localhost:3000"),
            rp_name: env_or("RP_NAME", "WardSeal"),
            totp_issuer: env_or("TOTP_ISSUER", "WardSeal"),
            default_tenant_id,
            maintenance_interval_secs: env_or("MAINTENANCE_INTERVAL_SECS", "300").parse()?,
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.server_host, self.server_port).parse()?)
    }
}

/// The store seam: every backend the orchestrator composes over.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientStore>,
    pub codes: Arc<dyn CodeStore>,
    pub refresh: Arc<dyn RefreshStore>,
    pub revocation: Arc<dyn RevocationStore>,
    pub attempts: Arc<dyn LoginAttemptStore>,
    pub totp: Arc<dyn TotpStore>,
    pub webauthn: Arc<dyn WebAuthnStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub signals: Arc<dyn SignalStore>,
}

impl Stores {
    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            clients: Arc::new(MySqlClientStore::new(pool.clone())),
            codes: Arc::new(MySqlCodeStore::new(pool.clone())),
            refresh: Arc::new(MySqlRefreshStore::new(pool.clone())),
            revocation: Arc::new(MySqlRevocationStore::new(pool.clone())),
            attempts: Arc::new(MySqlLoginAttemptStore::new(pool.clone())),
            totp: Arc::new(MySqlTotpStore::new(pool.clone())),
            webauthn: Arc::new(MySqlWebAuthnStore::new(pool.clone())),
            devices: Arc::new(MySqlDeviceStore::new(pool.clone())),
            signals: Arc::new(MySqlSignalStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            clients: Arc::new(InMemoryClientStore::new()),
            codes: Arc::new(InMemoryCodeStore::new()),
            refresh: Arc::new(InMemoryRefreshStore::new()),
            revocation: Arc::new(InMemoryRevocationStore::new()),
            attempts: Arc::new(InMemoryLoginAttemptStore::new()),
            totp: Arc::new(InMemoryTotpStore::new()),
            webauthn: Arc::new(InMemoryWebAuthnStore::new()),
            devices: Arc::new(InMemoryDeviceStore::new()),
            signals: Arc::new(InMemorySignalStore::new()),
        }
    }
}

/// Shared application state. The signing key and relying party are built
/// once at startup and never mutate.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: Arc<KeyMaterial>,
    pub webauthn: Arc<Webauthn>,
    pub directory: Arc<dyn DirectoryClient>,
    pub stores: Stores,
    /// Present in MySQL deployments; readiness pings it.
    pub pool: Option<MySqlPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        keys: Arc<KeyMaterial>,
        directory: Arc<dyn DirectoryClient>,
        stores: Stores,
        pool: Option<MySqlPool>,
    ) -> anyhow::Result<Self> {
        let webauthn = build_relying_party(&config.rp_id, &config.rp_origin, &config.rp_name)?;
        Ok(Self {
            config: Arc::new(config),
            keys,
            webauthn: Arc::new(webauthn),
            directory,
            stores,
            pool,
        })
    }

    pub fn secure_cookies(&self) -> bool {
        self.config.environment.is_production()
    }

    pub fn oauth_service(&self) -> OAuthService {
        OAuthService::new(
            self.stores.clients.clone(),
            self.stores.codes.clone(),
            self.stores.refresh.clone(),
            self.stores.revocation.clone(),
            self.stores.signals.clone(),
            self.keys.clone(),
        )
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.directory.clone(),
            self.stores.attempts.clone(),
            self.stores.devices.clone(),
            self.stores.signals.clone(),
            self.stores.refresh.clone(),
            self.stores.webauthn.clone(),
            self.totp_service(),
            self.keys.clone(),
        )
    }

    pub fn totp_service(&self) -> TotpService {
        TotpService::new(self.stores.totp.clone(), self.config.totp_issuer.clone())
    }

    pub fn webauthn_service(&self) -> WebAuthnService {
        WebAuthnService::new(
            self.webauthn.clone(),
            self.stores.webauthn.clone(),
            self.keys.clone(),
        )
    }
}
