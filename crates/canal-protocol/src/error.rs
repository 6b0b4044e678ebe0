//! Error types for the protocol layer.
//!
//! Framing problems and schema problems are kept apart: a [`FrameError`]
//! means the byte stream itself can no longer be trusted, while a
//! [`ProtocolError::Decode`] means a well-delimited body didn't match the
//! schema it was supposed to carry.

/// Errors produced while reading or writing a length-prefixed frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended cleanly before the first byte of a frame header.
    #[error("stream closed before a frame header was read")]
    Closed,

    /// The stream ended before the declared number of bytes arrived.
    ///
    /// `expected` is the size of the section being read (4 for the
    /// header, the declared body length otherwise) and `received` is how
    /// many of those bytes actually arrived.
    #[error("short read: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// The declared body length exceeds the configured cap.
    #[error("frame body of {length} bytes exceeds limit of {max} bytes")]
    TooLarge { length: usize, max: usize },

    /// The underlying reader or writer failed.
    #[error("frame i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame could not be read or written.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A body failed protobuf decoding.
    ///
    /// Common causes: truncated bodies, a body decoded as the wrong
    /// message shape, or a peer speaking a different schema version.
    #[error("decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}
