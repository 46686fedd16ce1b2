//! Message routing over the connection registry.
//!
//! The router resolves a message's recipient to their live connection and
//! enqueues the delivery on that connection's bounded outbound queue. It is
//! pure routing over identities: content is not validated here, and a
//! missing recipient is an outcome, not an error.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::registry::{ConnectionRegistry, SendResult};
use crate::types::{Delivery, Message};

/// Result of a routing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The recipient has a live connection and the delivery was handed to it.
    ///
    /// Best-effort: also reported when the recipient's outbound queue was
    /// full and the delivery was dropped per the backpressure policy.
    Delivered,
    /// The recipient has no live connection
    RecipientAbsent,
}

/// Router for direct messages between connected users.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    /// Create a router over a connection registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Route a message to its recipient's live connection.
    ///
    /// Never blocks on the recipient's consumption speed: the outbound queue
    /// is bounded and a full queue drops the new delivery with a warning.
    /// The sender is not notified when the recipient is absent; the caller
    /// may surface the outcome if it wants to.
    #[instrument(skip(self, message), fields(from = %message.sender, to = %message.recipient))]
    pub fn route(&self, message: Message) -> RouteOutcome {
        let delivery = Delivery {
            sender: message.sender,
            body: message.body,
        };

        match self.registry.send_to(&message.recipient, delivery) {
            SendResult::Sent => {
                debug!("Message delivered");
                RouteOutcome::Delivered
            }
            SendResult::ChannelFull => {
                warn!("Recipient queue full, message dropped");
                RouteOutcome::Delivered
            }
            SendResult::NotConnected | SendResult::ChannelClosed => {
                debug!("Recipient not present");
                RouteOutcome::RecipientAbsent
            }
        }
    }
}
