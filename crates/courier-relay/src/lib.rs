//! # courier-relay
//!
//! Direct-message relay core for Courier: authentication-gated connection
//! admission, the identity-to-connection registry, message routing, and
//! connection teardown.
//!
//! ## Architecture
//!
//! - **Server**: TCP accept loop spawning one task per connection
//! - **Session**: per-connection state machine
//!   (Unauthenticated -> Authenticated -> Closed) owning frame decode/encode
//! - **Registry**: concurrency-safe map from user identity to the live
//!   connection handle, at most one entry per user (last connection wins)
//! - **Router**: resolves a recipient through the registry and enqueues the
//!   delivery on that connection's bounded outbound queue
//!
//! Credential verification is delegated to the host through
//! [`IdentityVerifier`]; the relay never sees how tokens are issued.

pub mod auth;
pub mod registry;
pub mod routing;
pub mod server;
pub mod session;
pub mod wire;

mod error;
mod types;

pub use auth::IdentityVerifier;
pub use error::RelayError;
pub use registry::{ConnectionHandle, ConnectionRegistry, SendResult};
pub use routing::{MessageRouter, RouteOutcome};
pub use server::{RelayConfig, RelayServer};
pub use session::{Session, SessionState};
pub use types::{ConnectionId, Delivery, Message, UserId};
pub use wire::{ClientFrame, ServerFrame};
