//! Error types for the relay core.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO error (network)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or oversized wire frame
    #[error("frame error: {0}")]
    Frame(String),

    /// No handshake credential arrived within the configured timeout
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Credential rejected by the identity verifier
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Create a new frame error.
    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame(msg.into())
    }

    /// Create a new authentication error.
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<LinesCodecError> for RelayError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                Self::frame("frame exceeds maximum line length")
            }
            LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}
