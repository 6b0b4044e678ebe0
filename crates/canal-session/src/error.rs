//! Error types for the session layer.

use canal_protocol::{FrameError, PacketType, ProtocolError};
use canal_transport::TransportError;

use crate::SessionState;

/// Errors returned by [`Session`](crate::Session) operations.
///
/// None of them are retried internally: retry policy belongs to the
/// caller. [`is_fatal`](Self::is_fatal) tells whether the session has no
/// usable connection left.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dialing, writing, or the connection closing underneath the session.
    #[error(transparent)]
    Transport(TransportError),

    /// The inbound byte stream is malformed; it can't be trusted further.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// The server spoke a protocol version other than 1.
    #[error("unsupported protocol version {version}")]
    UnsupportedVersion { version: i32 },

    /// A specific packet type was required and another one arrived.
    #[error("expected {expected} packet, found type {found}")]
    Protocol { expected: PacketType, found: i32 },

    /// The reply to a request had a type that makes no sense for it.
    /// Request/reply pairing is lost, so the session closes.
    #[error("unexpected packet type {packet_type}")]
    UnexpectedPacket { packet_type: i32 },

    /// A handshake or authentication reply body failed to decode.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(ProtocolError),

    /// The server rejected the credentials.
    #[error("authentication failed ({code}): {message}")]
    Authentication { code: i32, message: String },

    /// The server rejected a subscribe or unsubscribe.
    #[error("subscription failed ({code}): {message}")]
    Subscription { code: i32, message: String },

    /// A batch arrived with a compression the client can't read.
    #[error("unsupported compression {compression}")]
    UnsupportedCompression { compression: i32 },

    /// A reply body or entry failed schema decoding. The exchange itself
    /// completed, so the session stays usable.
    #[error("decode failed: {0}")]
    Decode(ProtocolError),

    /// The server answered a request with an error ack.
    #[error("server error ({code}): {message}")]
    Server { code: i32, message: String },

    /// The operation isn't allowed in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    /// Returns `true` when the session has no usable connection: either
    /// it closed the connection before returning this error (its state is
    /// then `Closed`), or `connect` never established one.
    ///
    /// Every other error leaves the session in a state where it can keep
    /// going.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Frame(_)
                | Self::UnsupportedVersion { .. }
                | Self::Protocol { .. }
                | Self::UnexpectedPacket { .. }
                | Self::MalformedHandshake(_)
        )
    }
}

/// A broken frame becomes a [`Frame`] error; everything else, including a
/// packet envelope that doesn't decode, stays a transport error.
///
/// [`Frame`]: SessionError::Frame
impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ReceiveFailed(ProtocolError::Frame(e)) => Self::Frame(e),
            other => Self::Transport(other),
        }
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Frame(e) => Self::Frame(e),
            e @ ProtocolError::Decode(_) => Self::Decode(e),
        }
    }
}
