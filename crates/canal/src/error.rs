//! Unified error type for the canal client.

use canal_protocol::ProtocolError;
use canal_session::SessionError;
use canal_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// Sub-crate errors convert with `?`, so code using the facade only
/// needs this one type.
#[derive(Debug, thiserror::Error)]
pub enum CanalError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The client configuration couldn't be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl CanalError {
    /// Returns `true` when the session that produced the error has no
    /// usable connection and must be replaced. See
    /// [`SessionError::is_fatal`].
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Session(e) => e.is_fatal(),
            Self::Protocol(_) | Self::Config(_) => false,
        }
    }
}
