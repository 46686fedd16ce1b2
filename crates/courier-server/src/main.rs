use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use courier_relay::RelayServer;

mod auth;
mod config;
mod db;
mod server;
mod telemetry;

use auth::{TokenService, UserStore};
use config::ServerConfig;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init().map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Courier server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig::from_env()?;
    server_config.log_config();

    let pool = db::connect(&server_config.db_path).await?;
    db::migrate(&pool).await?;

    let tokens = Arc::new(TokenService::new(
        &server_config.token_secret,
        server_config.token_ttl_secs,
    ));
    let users = UserStore::new(pool);

    let relay = RelayServer::new(server_config.relay_config(), Arc::clone(&tokens));
    let registry = Arc::clone(relay.registry());

    let state = Arc::new(AppState {
        users,
        tokens,
        registry,
    });

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let relay_listener = TcpListener::bind(server_config.relay_addr).await?;
    let http_listener = TcpListener::bind(server_config.http_addr).await?;
    info!(addr = %server_config.http_addr, "HTTP API listening");

    let http_shutdown = shutdown.clone();
    let http_task = axum::serve(http_listener, server::router(state))
        .with_graceful_shutdown(async move { http_shutdown.cancelled().await });

    tokio::try_join!(
        async { relay.run(relay_listener, shutdown.clone()).await.map_err(anyhow::Error::from) },
        async { http_task.await.map_err(anyhow::Error::from) },
    )?;

    telemetry::shutdown();

    Ok(())
}
