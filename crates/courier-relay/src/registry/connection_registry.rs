//! Connection Registry implementation.
//!
//! Tracks the currently live connection for each authenticated user so the
//! router can deliver direct messages. At most one entry is live per user:
//! a new registration for the same user replaces the prior one
//! (last connection wins).

use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::types::{ConnectionId, Delivery, UserId};

/// Capability representing one live transport connection.
///
/// Cloneable; clones refer to the same connection. Supports enqueueing a
/// delivery onto the connection's bounded outbound queue and requesting the
/// connection to close.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Identifier distinguishing this connection from any other
    id: ConnectionId,
    /// Channel draining into the owning session's write loop
    outbound: mpsc::Sender<Delivery>,
    /// Cancellation signal observed by the owning session
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle for a connection's outbound queue.
    pub fn new(
        id: ConnectionId,
        outbound: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            outbound,
            cancel,
        }
    }

    /// Identifier of the underlying connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Ask the owning session to close its transport and tear down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the owning session has stopped draining the queue.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    pub(crate) fn try_deliver(
        &self,
        delivery: Delivery,
    ) -> Result<(), mpsc::error::TrySendError<Delivery>> {
        self.outbound.try_send(delivery)
    }
}

/// Result of attempting to enqueue a delivery for a connection.
#[derive(Debug)]
pub enum SendResult {
    /// Delivery was queued on the recipient's outbound channel
    Sent,
    /// The recipient has no live connection
    NotConnected,
    /// The recipient's outbound channel is full; the delivery was dropped
    ChannelFull,
    /// The recipient's outbound channel is closed; the stale entry was evicted
    ChannelClosed,
}

/// Registry of live connections, keyed by authenticated identity.
///
/// Thread-safe; uses DashMap so that operations on different users do not
/// contend. Sessions mutate the mapping only through [`register`] and
/// [`deregister`], and no registry operation performs I/O or awaits while a
/// shard lock is held.
///
/// [`register`]: ConnectionRegistry::register
/// [`deregister`]: ConnectionRegistry::deregister
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create a new connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Install or replace the mapping for an identity. Never fails.
    ///
    /// If a prior handle existed it is overwritten but not closed; the old
    /// session remains responsible for its own teardown when its transport
    /// eventually closes, and the guarded [`deregister`] keeps that teardown
    /// from evicting this newer registration.
    ///
    /// [`deregister`]: ConnectionRegistry::deregister
    #[instrument(skip(self, handle), fields(identity = %identity, connection = %handle.id()))]
    pub fn register(&self, identity: UserId, handle: ConnectionHandle) {
        let existing = self.connections.insert(identity, handle);
        if existing.is_some() {
            debug!("Replaced existing connection registration");
        } else {
            debug!("Registered new connection");
        }
    }

    /// Remove the mapping for an identity, but only if the live entry is
    /// exactly `handle`'s connection.
    ///
    /// A mismatched or absent entry is a benign no-op: it means a newer
    /// connection for the same identity superseded this one, and its
    /// registration must survive. Returns whether an entry was removed.
    #[instrument(skip(self, handle), fields(identity = %identity, connection = %handle.id()))]
    pub fn deregister(&self, identity: &UserId, handle: &ConnectionHandle) -> bool {
        let removed = self
            .connections
            .remove_if(identity, |_, current| current.id() == handle.id());
        if removed.is_some() {
            debug!("Deregistered connection");
            true
        } else {
            debug!("Stale deregister ignored, a newer connection owns the entry");
            false
        }
    }

    /// Current handle for an identity, if one is registered.
    pub fn lookup(&self, identity: &UserId) -> Option<ConnectionHandle> {
        self.connections.get(identity).map(|e| e.value().clone())
    }

    /// Check if an identity currently has a live connection.
    pub fn is_connected(&self, identity: &UserId) -> bool {
        self.connections.contains_key(identity)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Enqueue a delivery for an identity's live connection.
    ///
    /// Non-blocking: a full outbound channel drops the new delivery rather
    /// than stalling the sender. A closed channel evicts the stale entry,
    /// guarded by connection id so a concurrent re-registration is untouched.
    #[instrument(skip(self, delivery), fields(to = %identity))]
    pub fn send_to(&self, identity: &UserId, delivery: Delivery) -> SendResult {
        let handle = match self.connections.get(identity) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!("Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match handle.try_deliver(delivery) {
            Ok(()) => {
                debug!("Delivery queued");
                SendResult::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound channel full, dropping delivery");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, evicting stale entry");
                self.connections
                    .remove_if(identity, |_, current| current.id() == handle.id());
                SendResult::ChannelClosed
            }
        }
    }

    /// Snapshot of all identities with a live connection.
    ///
    /// Used by the presence reporting endpoint.
    pub fn active_users(&self) -> Vec<UserId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(ConnectionId::next(), tx, CancellationToken::new());
        (handle, rx)
    }

    fn delivery(sender: &str, body: &str) -> Delivery {
        Delivery {
            sender: UserId::from(sender),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_register_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, _rx) = test_handle(16);

        registry.register(user.clone(), handle.clone());

        assert!(registry.is_connected(&user));
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.lookup(&user).unwrap().id(), handle.id());
    }

    #[test]
    fn test_register_replaces_existing() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (old, _rx1) = test_handle(16);
        let (new, _rx2) = test_handle(16);

        registry.register(user.clone(), old);
        registry.register(user.clone(), new.clone());

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.lookup(&user).unwrap().id(), new.id());
    }

    #[test]
    fn test_deregister_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, _rx) = test_handle(16);

        registry.register(user.clone(), handle.clone());
        assert!(registry.deregister(&user, &handle));
        assert!(!registry.is_connected(&user));
    }

    #[test]
    fn test_deregister_nonexistent_is_noop() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, _rx) = test_handle(16);

        assert!(!registry.deregister(&user, &handle));
    }

    #[test]
    fn test_stale_deregister_does_not_evict_newer_registration() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (old, _rx1) = test_handle(16);
        let (new, _rx2) = test_handle(16);

        registry.register(user.clone(), old.clone());
        registry.register(user.clone(), new.clone());

        // The superseded session tears down with its own handle.
        assert!(!registry.deregister(&user, &old));
        assert_eq!(registry.lookup(&user).unwrap().id(), new.id());
    }

    #[test]
    fn test_send_to_connected_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, mut rx) = test_handle(16);

        registry.register(user.clone(), handle);

        let result = registry.send_to(&user, delivery("bob", "hi"));
        assert!(matches!(result, SendResult::Sent));
        assert_eq!(rx.try_recv().unwrap(), delivery("bob", "hi"));
    }

    #[test]
    fn test_send_to_disconnected_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");

        let result = registry.send_to(&user, delivery("bob", "hi"));
        assert!(matches!(result, SendResult::NotConnected));
    }

    #[test]
    fn test_send_to_full_channel_drops_delivery() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, mut rx) = test_handle(1);

        registry.register(user.clone(), handle);

        assert!(matches!(
            registry.send_to(&user, delivery("bob", "first")),
            SendResult::Sent
        ));
        assert!(matches!(
            registry.send_to(&user, delivery("bob", "second")),
            SendResult::ChannelFull
        ));

        // Only the first delivery made it onto the queue.
        assert_eq!(rx.try_recv().unwrap(), delivery("bob", "first"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_closed_channel_evicts_entry() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("alice");
        let (handle, rx) = test_handle(16);

        registry.register(user.clone(), handle);
        drop(rx);

        let result = registry.send_to(&user, delivery("bob", "hi"));
        assert!(matches!(result, SendResult::ChannelClosed));
        assert!(!registry.is_connected(&user));
    }

    #[test]
    fn test_active_users_snapshot() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = test_handle(16);
        let (h2, _rx2) = test_handle(16);

        registry.register(UserId::from("alice"), h1);
        registry.register(UserId::from("bob"), h2);

        let mut users = registry.active_users();
        users.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(users, vec![UserId::from("alice"), UserId::from("bob")]);
    }

    #[test]
    fn test_handle_close_cancels_token() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = ConnectionHandle::new(ConnectionId::next(), tx, cancel.clone());

        assert!(!cancel.is_cancelled());
        handle.close();
        assert!(cancel.is_cancelled());
    }
}
