//! Wire protocol for the canal client.
//!
//! This crate defines the "language" the client and a canal server speak:
//!
//! - **Types** ([`Packet`], [`Handshake`], [`ClientAuth`], [`Get`], etc.):
//!   the protobuf envelopes and bodies that travel on the wire.
//! - **Entries** ([`Entry`], [`RowChange`], etc.): the change records
//!   carried inside a [`Messages`] body.
//! - **Codec** ([`encode_message`], [`decode_message`]): how a body
//!   is turned into bytes and back.
//! - **Frames** ([`encode_frame`], [`read_frame`], etc.): the 4-byte
//!   big-endian length prefix that delimits packets on the stream.
//! - **Errors** ([`ProtocolError`], [`FrameError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (a byte stream) and session
//! (identity and batch bookkeeping). It doesn't know about sockets or
//! subscriptions; it only knows how to frame, encode and decode packets.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Session (batches)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod entry;
mod error;
mod frame;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{decode_message, encode_message};
pub use entry::{
    Column, Entry, EntryType, EventType, Header, Pair, RowChange, RowData,
    SourceType, TransactionBegin, TransactionEnd,
};
pub use error::{FrameError, ProtocolError};
pub use frame::{
    decode_frame, encode_frame, read_frame, write_frame,
    DEFAULT_MAX_FRAME_LENGTH, LENGTH_PREFIX_LEN,
};
pub use types::{
    Ack, ClientAck, ClientAuth, ClientRollback, Compression, Get, Handshake,
    Messages, Packet, PacketType, Sub, TimeUnit, Unsub, PROTOCOL_VERSION,
};
