use std::time::Duration;

use canal_protocol::{FrameError, ProtocolError};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dialing the server failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Dialing the server didn't complete within the dial timeout.
    #[error("connect to {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] FrameError),

    /// Reading or decoding an inbound frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] ProtocolError),

    /// The connection was closed, locally or because a pump task stopped.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Shutting the socket down failed.
    #[error("close failed: {0}")]
    CloseFailed(#[source] std::io::Error),
}
