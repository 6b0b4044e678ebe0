//! Batches and the decoder that turns a reply packet into one.

use canal_protocol::{
    decode_message, Ack, Entry, Messages, Packet, PacketType,
};

use crate::SessionError;

/// Batch id the server uses for "nothing available yet".
///
/// A batch with this id carries no entries and must never be acked or
/// rolled back.
pub const NO_DATA_BATCH_ID: i64 = -1;

/// Batch id that rolls back every outstanding batch of the session.
pub const ROLLBACK_ALL: i64 = 0;

/// A group of change entries delivered together under one batch id.
///
/// The id is the unit of acknowledgement: ack or roll back exactly the id
/// you were given. A batch is immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    id: i64,
    entries: Vec<Entry>,
    raw_entries: Vec<Vec<u8>>,
    is_raw: bool,
}

impl Batch {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Decoded entries. Empty for a raw batch.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Undecoded entry payloads. Empty unless the batch is raw.
    pub fn raw_entries(&self) -> &[Vec<u8>] {
        &self.raw_entries
    }

    /// `true` when entry decoding was deferred (lazy parsing).
    pub fn is_raw(&self) -> bool {
        self.is_raw
    }

    /// `true` for the "no data available" sentinel.
    pub fn is_no_data(&self) -> bool {
        self.id == NO_DATA_BATCH_ID
    }

    /// Number of entries, decoded or raw.
    pub fn len(&self) -> usize {
        if self.is_raw {
            self.raw_entries.len()
        } else {
            self.entries.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the batch's entries, decoding raw payloads if needed.
    ///
    /// Decoding is all-or-nothing, exactly as in eager mode.
    ///
    /// # Errors
    /// Returns [`SessionError::Decode`] if any raw payload isn't an entry.
    pub fn decode_entries(&self) -> Result<Vec<Entry>, SessionError> {
        if self.is_raw {
            decode_entries(&self.raw_entries)
        } else {
            Ok(self.entries.clone())
        }
    }

    /// Consumes the batch, returning its decoded entries.
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

/// Turns the reply to a get request into a [`Batch`].
///
/// - `MESSAGES` with a passthrough compression becomes a batch; with
///   `lazy` the payloads are kept verbatim, otherwise every payload is
///   decoded and one bad payload fails the whole batch.
/// - `ACK` means the server rejected the request and becomes
///   [`SessionError::Server`].
/// - Anything else is [`SessionError::UnexpectedPacket`].
pub fn decode_batch(packet: Packet, lazy: bool) -> Result<Batch, SessionError> {
    match packet.kind() {
        Ok(PacketType::Messages) => decode_messages(packet, lazy),
        Ok(PacketType::Ack) => {
            let ack: Ack = decode_message(&packet.body).map_err(SessionError::Decode)?;
            Err(SessionError::Server {
                code: ack.code(),
                message: ack.error_message,
            })
        }
        Ok(
            kind @ (PacketType::CompatibleProto2
            | PacketType::Handshake
            | PacketType::ClientAuthentication
            | PacketType::Subscription
            | PacketType::Unsubscription
            | PacketType::Get
            | PacketType::ClientAck
            | PacketType::Shutdown
            | PacketType::Dump
            | PacketType::Heartbeat
            | PacketType::ClientRollback),
        ) => Err(SessionError::UnexpectedPacket {
            packet_type: kind as i32,
        }),
        Err(raw) => Err(SessionError::UnexpectedPacket { packet_type: raw }),
    }
}

fn decode_messages(packet: Packet, lazy: bool) -> Result<Batch, SessionError> {
    match packet.effective_compression() {
        Ok(compression) if compression.is_passthrough() => {}
        Ok(compression) => {
            return Err(SessionError::UnsupportedCompression {
                compression: compression as i32,
            });
        }
        Err(raw) => {
            return Err(SessionError::UnsupportedCompression { compression: raw });
        }
    }

    let messages: Messages =
        decode_message(&packet.body).map_err(SessionError::Decode)?;

    if lazy {
        return Ok(Batch {
            id: messages.batch_id,
            entries: Vec::new(),
            raw_entries: messages.messages,
            is_raw: true,
        });
    }

    Ok(Batch {
        id: messages.batch_id,
        entries: decode_entries(&messages.messages)?,
        raw_entries: Vec::new(),
        is_raw: false,
    })
}

fn decode_entries(payloads: &[Vec<u8>]) -> Result<Vec<Entry>, SessionError> {
    payloads
        .iter()
        .map(|payload| decode_message::<Entry>(payload).map_err(SessionError::Decode))
        .collect()
}
