use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wardseal_auth::app::create_router;
use wardseal_auth::config::{AppState, Config, Stores};
use wardseal_auth::keys::KeyMaterial;
use wardseal_auth::services::HttpDirectoryClient;
use wardseal_auth::workers::maintenance;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("wardseal_auth={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::info!(%endpoint, "OTLP export configured; spans ship via the collector");
    }

    // Fatal when a configured key cannot be loaded.
    let keys = KeyMaterial::load_or_generate(config.jwt_private_key_path.as_deref())?;
    tracing::info!(kid = keys.kid(), "signing key ready");

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let directory = Arc::new(HttpDirectoryClient::new(
        &config.directory_service_url,
        &config.service_auth_header,
        &config.service_auth_token,
    )?);

    let stores = Stores::mysql(pool.clone());
    let maintenance_interval = config.maintenance_interval_secs;
    let addr = config.socket_addr()?;
    let state = AppState::new(config, Arc::new(keys), directory, stores.clone(), Some(pool))?;

    tokio::spawn(maintenance::run(stores, maintenance_interval));

    let app = create_router(state);

    tracing::info!(
        "WardSeal auth core v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }
}
