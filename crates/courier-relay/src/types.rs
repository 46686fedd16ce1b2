//! Shared value types for the relay core.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Stable identifier for an authenticated party.
///
/// Issued by the identity verifier; the relay treats it as opaque and only
/// relies on equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ephemeral identifier for one accepted transport connection.
///
/// Distinguishes successive connections made by the same user so that a
/// stale session's teardown cannot evict a newer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate the next process-wide connection identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A direct message in flight from one user to another.
///
/// Immutable once constructed; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Authenticated identity of the sender
    pub sender: UserId,
    /// Identity the message is addressed to
    pub recipient: UserId,
    /// Message text
    pub body: String,
}

/// The unit enqueued on a recipient's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Authenticated identity of the sender
    pub sender: UserId,
    /// Message text
    pub body: String,
}
