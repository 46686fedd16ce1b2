//! Server configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use base64::prelude::*;
use rand::RngCore;
use tracing::{info, warn};

use courier_relay::RelayConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the HTTP API (registration, login, presence)
    pub http_addr: SocketAddr,
    /// Address for the message relay listener
    pub relay_addr: SocketAddr,
    /// SQLite database path, or `:memory:` for an ephemeral database
    pub db_path: String,
    /// Secret used to sign authentication tokens
    pub token_secret: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: i64,
    /// Relay handshake timeout in seconds
    pub handshake_timeout_secs: u64,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_HTTP_ADDR`: HTTP API bind address. Default: `0.0.0.0:5090`
    /// - `COURIER_RELAY_ADDR`: Relay bind address. Default: `0.0.0.0:5091`
    /// - `COURIER_DB_PATH`: SQLite path. Default: `courier.db`
    /// - `COURIER_TOKEN_SECRET`: Token signing secret. Default: random per process
    /// - `COURIER_TOKEN_TTL_SECS`: Token lifetime. Default: `3600`
    /// - `COURIER_HANDSHAKE_TIMEOUT_SECS`: Relay handshake timeout. Default: `10`
    pub fn from_env() -> anyhow::Result<Self> {
        let http_addr = env_or("COURIER_HTTP_ADDR", "0.0.0.0:5090")
            .parse()
            .context("invalid COURIER_HTTP_ADDR")?;
        let relay_addr = env_or("COURIER_RELAY_ADDR", "0.0.0.0:5091")
            .parse()
            .context("invalid COURIER_RELAY_ADDR")?;
        let db_path = env_or("COURIER_DB_PATH", "courier.db");

        let token_secret = match std::env::var("COURIER_TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("COURIER_TOKEN_SECRET not set, generating an ephemeral secret; tokens will not survive a restart");
                generate_secret()
            }
        };

        let token_ttl_secs = env_or("COURIER_TOKEN_TTL_SECS", "3600")
            .parse()
            .context("invalid COURIER_TOKEN_TTL_SECS")?;
        let handshake_timeout_secs = env_or("COURIER_HANDSHAKE_TIMEOUT_SECS", "10")
            .parse()
            .context("invalid COURIER_HANDSHAKE_TIMEOUT_SECS")?;

        Ok(Self {
            http_addr,
            relay_addr,
            db_path,
            token_secret,
            token_ttl_secs,
            handshake_timeout_secs,
        })
    }

    /// Relay configuration derived from this server configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            ..RelayConfig::default()
        }
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("HTTP API: {}", self.http_addr);
        info!("Relay: {}", self.relay_addr);
        info!("Database: {}", self.db_path);
        info!("Token TTL: {}s", self.token_ttl_secs);
        info!("Handshake timeout: {}s", self.handshake_timeout_secs);
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    BASE64_STANDARD.encode(bytes)
}
