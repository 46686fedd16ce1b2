//! Relay server: accept loop and per-connection task spawning.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::auth::IdentityVerifier;
use crate::registry::ConnectionRegistry;
use crate::routing::MessageRouter;
use crate::session::Session;
use crate::RelayError;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long an accepted connection may stay unauthenticated
    pub handshake_timeout: Duration,
    /// Bounded capacity of each session's outbound delivery queue
    pub outbound_queue_capacity: usize,
    /// Maximum length of one wire frame in bytes
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 256,
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// Relay server instance.
///
/// Owns the connection registry and router shared by all sessions; the
/// host supplies the identity verifier that gates admission.
pub struct RelayServer<V: IdentityVerifier> {
    config: RelayConfig,
    verifier: Arc<V>,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
}

impl<V: IdentityVerifier> RelayServer<V> {
    /// Create a new relay server instance.
    pub fn new(config: RelayConfig, verifier: Arc<V>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&registry)));

        Self {
            config,
            verifier,
            registry,
            router,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accept connections until the shutdown token is cancelled.
    ///
    /// Each accepted connection runs as its own task; accept errors are
    /// logged and do not stop the loop.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_token: CancellationToken,
    ) -> Result<(), RelayError> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Relay server listening");

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("Relay server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let verifier = Arc::clone(&self.verifier);
            let registry = Arc::clone(&self.registry);
            let router = Arc::clone(&self.router);
            let config = self.config.clone();

            tokio::spawn(
                async move {
                    if let Err(e) = Session::handle_connection(
                        stream, peer_addr, verifier, registry, router, config,
                    )
                    .await
                    {
                        warn!(error = %e, "Connection error");
                    }
                }
                .instrument(info_span!(
                    "relay.connection.lifecycle",
                    client_ip = %peer_addr,
                    identity = tracing::field::Empty, // Set after authentication
                )),
            );
        }
    }
}
