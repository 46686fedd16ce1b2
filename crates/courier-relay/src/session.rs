//! Per-connection session state machine.
//!
//! Each accepted transport connection is driven by one task through the
//! lifecycle Unauthenticated -> Authenticated -> Closed. The session owns
//! frame decoding and encoding for its connection; the registry entry it
//! installs on authentication is removed again, guarded by connection id,
//! exactly once during teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::IdentityVerifier;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::routing::MessageRouter;
use crate::server::RelayConfig;
use crate::types::{ConnectionId, Delivery, Message, UserId};
use crate::wire::{ClientFrame, ServerFrame};
use crate::RelayError;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, awaiting the handshake credential
    Unauthenticated,
    /// Admitted and registered for message delivery
    Authenticated,
    /// Terminal; the transport has been released
    Closed,
}

/// Session driving a single client connection.
pub struct Session<V: IdentityVerifier> {
    peer_addr: SocketAddr,
    framed: Framed<TcpStream, LinesCodec>,
    state: SessionState,
    verifier: Arc<V>,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    config: RelayConfig,
}

impl<V: IdentityVerifier> Session<V> {
    /// Handle a newly accepted connection through its full lifecycle.
    #[instrument(
        name = "relay.connection.handle",
        skip(stream, verifier, registry, router, config),
        fields(peer = %peer_addr, identity = tracing::field::Empty)
    )]
    pub async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        verifier: Arc<V>,
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
        config: RelayConfig,
    ) -> Result<(), RelayError> {
        info!("New connection from {}", peer_addr);

        let codec = LinesCodec::new_with_max_length(config.max_frame_bytes);
        let mut session = Self {
            peer_addr,
            framed: Framed::new(stream, codec),
            state: SessionState::Unauthenticated,
            verifier,
            registry,
            router,
            config,
        };

        session.run().await
    }

    /// Main connection lifecycle.
    async fn run(&mut self) -> Result<(), RelayError> {
        let identity = match timeout(self.config.handshake_timeout, self.handshake()).await {
            Ok(Ok(Some(identity))) => identity,
            Ok(Ok(None)) => {
                // Handshake rejected or peer left before authenticating.
                self.close().await;
                return Ok(());
            }
            Ok(Err(e)) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
            Err(_) => {
                debug!(peer = %self.peer_addr, "Handshake timed out");
                let _ = self.send_frame(&ServerFrame::error("handshake timed out")).await;
                self.close().await;
                return Ok(());
            }
        };

        // Admitted: install the registry entry before acknowledging, so a
        // client that sees the welcome frame is already routable.
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity);
        let cancel = CancellationToken::new();
        let handle = ConnectionHandle::new(ConnectionId::next(), tx, cancel.clone());
        self.registry.register(identity.clone(), handle.clone());
        self.state = SessionState::Authenticated;

        tracing::Span::current().record("identity", identity.as_str());
        info!(identity = %identity, connection = %handle.id(), "Session established");

        let welcome = ServerFrame::Welcome {
            user_id: identity.clone(),
        };
        if self.send_frame(&welcome).await.is_ok() {
            self.process_frames(&identity, rx, cancel).await;
        }

        self.teardown(&identity, &handle).await;
        info!(identity = %identity, "Connection closed");
        Ok(())
    }

    /// Await and verify the handshake credential.
    ///
    /// Returns the admitted identity, or `None` when the attempt is over
    /// without one: the peer disconnected, sent a malformed frame, or failed
    /// verification. Application messages arriving before authentication are
    /// rejected and ignored; the surrounding handshake timeout bounds how
    /// long an unauthenticated peer can hold the connection.
    async fn handshake(&mut self) -> Result<Option<UserId>, RelayError> {
        loop {
            let line = match self.framed.next().await {
                None => {
                    debug!(peer = %self.peer_addr, "Connection closed before handshake");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(line)) => line,
            };

            match ClientFrame::decode(&line) {
                Ok(ClientFrame::Auth { token }) => {
                    return match self.verifier.verify(&token).await {
                        Ok(identity) => Ok(Some(identity)),
                        Err(e) => {
                            warn!(peer = %self.peer_addr, error = %e, "Handshake rejected");
                            let _ = self
                                .send_frame(&ServerFrame::error("authentication failed"))
                                .await;
                            Ok(None)
                        }
                    };
                }
                Ok(ClientFrame::Send { .. }) => {
                    warn!(peer = %self.peer_addr, "Unauthorized message before handshake, ignoring");
                }
                Err(e) => {
                    debug!(peer = %self.peer_addr, error = %e, "Malformed handshake frame");
                    let _ = self.send_frame(&ServerFrame::error("malformed frame")).await;
                    return Ok(None);
                }
            }
        }
    }

    /// Process frames until the connection is closed.
    ///
    /// Reads inbound frames and drains the outbound queue concurrently.
    /// Errors here end the session but never cross into other sessions.
    async fn process_frames(
        &mut self,
        identity: &UserId,
        mut rx: mpsc::Receiver<Delivery>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(identity = %identity, "Close requested");
                    break;
                }
                inbound = self.framed.next() => {
                    match inbound {
                        None => {
                            debug!(identity = %identity, "Peer disconnected");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(identity = %identity, error = %RelayError::from(e), "Transport failure");
                            break;
                        }
                        Some(Ok(line)) => {
                            if !self.handle_frame(identity, &line) {
                                break;
                            }
                        }
                    }
                }
                delivery = rx.recv() => {
                    let Some(delivery) = delivery else { break };
                    if let Err(e) = self.send_frame(&ServerFrame::receive(delivery)).await {
                        warn!(identity = %identity, error = %e, "Failed to write delivery");
                        break;
                    }
                }
            }
        }
    }

    /// Handle one inbound frame from an authenticated client.
    ///
    /// Returns whether the session should keep running.
    fn handle_frame(&self, identity: &UserId, line: &str) -> bool {
        match ClientFrame::decode(line) {
            Ok(ClientFrame::Send {
                recipient_id,
                message,
            }) => {
                let outcome = self.router.route(Message {
                    sender: identity.clone(),
                    recipient: recipient_id,
                    body: message,
                });
                debug!(identity = %identity, outcome = ?outcome, "Routed message");
                true
            }
            Ok(ClientFrame::Auth { .. }) => {
                // Already authenticated; re-auth is not part of the protocol.
                debug!(identity = %identity, "Ignoring repeated auth frame");
                true
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Malformed frame, closing connection");
                false
            }
        }
    }

    /// Tear the session down exactly once.
    ///
    /// Removes the registry entry (guarded by connection id, so a newer
    /// session for the same identity is untouched) and releases the
    /// transport.
    async fn teardown(&mut self, identity: &UserId, handle: &ConnectionHandle) {
        if self.state == SessionState::Closed {
            return;
        }
        self.registry.deregister(identity, handle);
        self.close().await;
    }

    async fn close(&mut self) {
        self.state = SessionState::Closed;
        let _ = SinkExt::<String>::close(&mut self.framed).await;
    }

    async fn send_frame(&mut self, frame: &ServerFrame) -> Result<(), RelayError> {
        let line = frame.encode()?;
        self.framed.send(line).await?;
        Ok(())
    }
}
