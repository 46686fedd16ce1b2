//! Wire protocol for client connections.
//!
//! Frames are newline-delimited JSON objects, one per line, carried over
//! `tokio_util::codec::LinesCodec`. Every frame is tagged with a `type`
//! field; field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{Delivery, UserId};
use crate::RelayError;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Handshake credential, expected as the first frame on a connection.
    Auth {
        /// Opaque credential, passed verbatim to the identity verifier
        token: String,
    },
    /// Direct message to another user.
    #[serde(rename_all = "camelCase")]
    Send {
        /// Identity the message is addressed to
        recipient_id: UserId,
        /// Message text
        message: String,
    },
}

impl ClientFrame {
    /// Decode a client frame from one line of input.
    pub fn decode(line: &str) -> Result<Self, RelayError> {
        serde_json::from_str(line).map_err(|e| RelayError::frame(e.to_string()))
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Handshake accepted; the connection is now authenticated.
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// Identity the connection was admitted under
        user_id: UserId,
    },
    /// Delivery of a message from another user.
    #[serde(rename_all = "camelCase")]
    Receive {
        /// Identity of the sender
        sender_id: UserId,
        /// Message text
        message: String,
    },
    /// Terminal protocol or handshake failure.
    Error {
        /// Human-readable reason
        reason: String,
    },
}

impl ServerFrame {
    /// Build a delivery frame from a queued delivery.
    pub fn receive(delivery: Delivery) -> Self {
        Self::Receive {
            sender_id: delivery.sender,
            message: delivery.body,
        }
    }

    /// Build an error frame.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Encode the frame as one line of output.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::frame(e.to_string()))
    }
}
