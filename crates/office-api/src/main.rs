//! Office workflow API server.

use office_api::config::ServerConfig;
use office_api::server::{self, AppState, Backends};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let backends = Backends::from_config(&config)?;
    tracing::info!(
        store = ?config.store,
        users = config.seed_users.len(),
        retention_days = config.default_retention_days,
        "backends ready"
    );
    let state = Arc::new(AppState::new(backends, config.default_retention_days));

    let app = server::router(state);
    tracing::info!("office API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
