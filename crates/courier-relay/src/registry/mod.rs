//! Connection registry: the presence table mapping users to live connections.

mod connection_registry;

pub use connection_registry::{ConnectionHandle, ConnectionRegistry, SendResult};
