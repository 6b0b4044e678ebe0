//! Packet envelope and body messages of the canal wire format.
//!
//! These are declared by hand with `prost` derive macros instead of being
//! generated from `.proto` files. Field numbers and enum values must match
//! the server's schema exactly.
//!
//! Several server fields are modelled as a single-field `oneof` so the
//! server can tell "absent" from "zero". A proto3 `optional` field is
//! wire-identical to that, so those fields are `Option<T>` here. Each one
//! documents the value the server assumes when it is absent.

use std::fmt;

use prost::Message;

use crate::codec::encode_message;

/// The only protocol version this client speaks.
pub const PROTOCOL_VERSION: i32 = 1;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// The kind of body carried by a [`Packet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PacketType {
    /// Placeholder for proto2 compatibility; never sent.
    CompatibleProto2 = 0,
    Handshake = 1,
    ClientAuthentication = 2,
    Ack = 3,
    Subscription = 4,
    Unsubscription = 5,
    Get = 6,
    Messages = 7,
    ClientAck = 8,
    Shutdown = 9,
    Dump = 10,
    Heartbeat = 11,
    ClientRollback = 12,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CompatibleProto2 => "PACKAGETYPECOMPATIBLEPROTO2",
            Self::Handshake => "HANDSHAKE",
            Self::ClientAuthentication => "CLIENTAUTHENTICATION",
            Self::Ack => "ACK",
            Self::Subscription => "SUBSCRIPTION",
            Self::Unsubscription => "UNSUBSCRIPTION",
            Self::Get => "GET",
            Self::Messages => "MESSAGES",
            Self::ClientAck => "CLIENTACK",
            Self::Shutdown => "SHUTDOWN",
            Self::Dump => "DUMP",
            Self::Heartbeat => "HEARTBEAT",
            Self::ClientRollback => "CLIENTROLLBACK",
        };
        f.write_str(name)
    }
}

/// Body compression declared by a [`Packet`].
///
/// The client only understands uncompressed bodies: [`Compression::None`]
/// and the legacy [`Compression::CompatibleProto2`], which older servers
/// send to mean the same thing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Compression {
    CompatibleProto2 = 0,
    None = 1,
    Zlib = 2,
    Gzip = 3,
    Lzf = 4,
}

impl Compression {
    /// Returns `true` if a body with this compression can be read as-is.
    pub fn is_passthrough(self) -> bool {
        matches!(self, Self::None | Self::CompatibleProto2)
    }
}

/// Time unit ordinal understood by the server for [`Get::unit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TimeUnit {
    Nanoseconds = 0,
    Microseconds = 1,
    Milliseconds = 2,
    Seconds = 3,
    Minutes = 4,
    Hours = 5,
    Days = 6,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The outer envelope of every frame.
#[derive(Clone, PartialEq, Message)]
pub struct Packet {
    /// Legacy magic number. Absent ⇒ 17. Ignored by this client.
    #[prost(int32, optional, tag = "1")]
    pub magic_number: Option<i32>,

    /// Protocol version. Absent ⇒ [`PROTOCOL_VERSION`].
    #[prost(int32, optional, tag = "2")]
    pub version: Option<i32>,

    /// Raw [`PacketType`] value. Kept as `i32` so unknown types survive
    /// decoding and can be reported.
    #[prost(enumeration = "PacketType", tag = "3")]
    pub r#type: i32,

    /// Raw [`Compression`] value. Absent ⇒ [`Compression::None`].
    #[prost(enumeration = "Compression", optional, tag = "4")]
    pub compression: Option<i32>,

    /// Body encoded as the message selected by `type`.
    #[prost(bytes = "vec", tag = "5")]
    pub body: Vec<u8>,
}

impl Packet {
    /// Wraps an encoded body in a version-1, uncompressed envelope.
    pub fn wrap<M: Message>(kind: PacketType, body: &M) -> Self {
        Self {
            magic_number: None,
            version: Some(PROTOCOL_VERSION),
            r#type: kind as i32,
            compression: None,
            body: encode_message(body),
        }
    }

    /// The declared version, applying the absent-means-1 default.
    pub fn effective_version(&self) -> i32 {
        self.version.unwrap_or(PROTOCOL_VERSION)
    }

    /// The declared packet type, or the raw value if it is unknown.
    pub fn kind(&self) -> Result<PacketType, i32> {
        PacketType::try_from(self.r#type).map_err(|_| self.r#type)
    }

    /// The declared compression, applying the absent-means-NONE default,
    /// or the raw value if it is unknown.
    pub fn effective_compression(&self) -> Result<Compression, i32> {
        match self.compression {
            None => Ok(Compression::None),
            Some(raw) => Compression::try_from(raw).map_err(|_| raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client bodies
// ---------------------------------------------------------------------------

/// First packet sent by the server on a new connection.
#[derive(Clone, PartialEq, Message)]
pub struct Handshake {
    /// Absent ⇒ "utf8".
    #[prost(string, optional, tag = "1")]
    pub communication_encoding: Option<String>,

    /// Random seed the client mixes into its authentication token.
    #[prost(bytes = "vec", tag = "2")]
    pub seeds: Vec<u8>,

    #[prost(enumeration = "Compression", tag = "3")]
    pub supported_compressions: i32,
}

/// Generic reply used for authentication, subscription and errors.
#[derive(Clone, PartialEq, Message)]
pub struct Ack {
    /// Absent ⇒ 0 (success).
    #[prost(int32, optional, tag = "1")]
    pub error_code: Option<i32>,

    #[prost(string, tag = "2")]
    pub error_message: String,
}

impl Ack {
    /// The error code with the absent-means-success default applied.
    pub fn code(&self) -> i32 {
        self.error_code.unwrap_or(0)
    }

    /// Returns `true` if the server reported success.
    pub fn is_success(&self) -> bool {
        self.code() == 0
    }
}

/// A batch of opaque entry payloads returned for a [`Get`].
#[derive(Clone, PartialEq, Message)]
pub struct Messages {
    #[prost(int64, tag = "1")]
    pub batch_id: i64,

    #[prost(bytes = "vec", repeated, tag = "2")]
    pub messages: Vec<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Client → server bodies
// ---------------------------------------------------------------------------

/// Authentication request answering a [`Handshake`].
#[derive(Clone, PartialEq, Message)]
pub struct ClientAuth {
    #[prost(string, tag = "1")]
    pub username: String,

    /// Hex-encoded scramble of the password, or empty for no password.
    #[prost(bytes = "vec", tag = "2")]
    pub password: Vec<u8>,

    /// Seconds. Absent ⇒ 0 (server default).
    #[prost(int32, optional, tag = "3")]
    pub net_read_timeout: Option<i32>,

    /// Seconds. Absent ⇒ 0 (server default).
    #[prost(int32, optional, tag = "4")]
    pub net_write_timeout: Option<i32>,

    #[prost(string, tag = "5")]
    pub destination: String,

    #[prost(string, tag = "6")]
    pub client_id: String,

    #[prost(string, tag = "7")]
    pub filter: String,

    #[prost(int64, tag = "8")]
    pub start_timestamp: i64,
}

/// Subscription request.
#[derive(Clone, PartialEq, Message)]
pub struct Sub {
    #[prost(string, tag = "1")]
    pub destination: String,

    #[prost(string, tag = "2")]
    pub client_id: String,

    #[prost(string, tag = "7")]
    pub filter: String,
}

/// Unsubscription request.
#[derive(Clone, PartialEq, Message)]
pub struct Unsub {
    #[prost(string, tag = "1")]
    pub destination: String,

    #[prost(string, tag = "2")]
    pub client_id: String,

    #[prost(string, tag = "7")]
    pub filter: String,
}

/// Pull request for the next batch.
#[derive(Clone, PartialEq, Message)]
pub struct Get {
    #[prost(string, tag = "1")]
    pub destination: String,

    #[prost(string, tag = "2")]
    pub client_id: String,

    #[prost(int32, tag = "3")]
    pub fetch_size: i32,

    /// Absent ⇒ -1 (wait indefinitely). 0 returns immediately.
    #[prost(int64, optional, tag = "4")]
    pub timeout: Option<i64>,

    /// [`TimeUnit`] ordinal for `timeout`. Absent ⇒ milliseconds.
    #[prost(int32, optional, tag = "5")]
    pub unit: Option<i32>,

    /// Absent ⇒ false.
    #[prost(bool, optional, tag = "6")]
    pub auto_ack: Option<bool>,
}

/// Acknowledges a batch. Has no reply.
#[derive(Clone, PartialEq, Message)]
pub struct ClientAck {
    #[prost(string, tag = "1")]
    pub destination: String,

    #[prost(string, tag = "2")]
    pub client_id: String,

    #[prost(int64, tag = "3")]
    pub batch_id: i64,
}

/// Rolls back a batch, or every outstanding batch when `batch_id` is 0.
/// Has no reply.
#[derive(Clone, PartialEq, Message)]
pub struct ClientRollback {
    #[prost(string, tag = "1")]
    pub destination: String,

    #[prost(string, tag = "2")]
    pub client_id: String,

    #[prost(int64, tag = "3")]
    pub batch_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_message;

    #[test]
    fn test_wrap_sets_version_and_type() {
        let sub = Sub {
            destination: "example".into(),
            client_id: "1001".into(),
            filter: ".*\\..*".into(),
        };
        let packet = Packet::wrap(PacketType::Subscription, &sub);
        assert_eq!(packet.version, Some(PROTOCOL_VERSION));
        assert_eq!(packet.kind(), Ok(PacketType::Subscription));
        let body: Sub = decode_message(&packet.body).unwrap();
        assert_eq!(body, sub);
    }

    #[test]
    fn test_absent_version_defaults_to_one() {
        let packet = Packet {
            magic_number: None,
            version: None,
            r#type: PacketType::Ack as i32,
            compression: None,
            body: Vec::new(),
        };
        assert_eq!(packet.effective_version(), 1);
        assert_eq!(packet.effective_compression(), Ok(Compression::None));
    }

    #[test]
    fn test_unknown_type_is_reported_raw() {
        let packet = Packet {
            magic_number: None,
            version: Some(1),
            r#type: 99,
            compression: Some(42),
            body: Vec::new(),
        };
        assert_eq!(packet.kind(), Err(99));
        assert_eq!(packet.effective_compression(), Err(42));
    }

    #[test]
    fn test_passthrough_compressions() {
        assert!(Compression::None.is_passthrough());
        assert!(Compression::CompatibleProto2.is_passthrough());
        assert!(!Compression::Gzip.is_passthrough());
        assert!(!Compression::Zlib.is_passthrough());
        assert!(!Compression::Lzf.is_passthrough());
    }

    #[test]
    fn test_packet_type_display_matches_wire_names() {
        assert_eq!(PacketType::ClientRollback.to_string(), "CLIENTROLLBACK");
        assert_eq!(PacketType::Messages.to_string(), "MESSAGES");
    }

    #[test]
    fn test_ack_defaults_to_success() {
        let ack = Ack::default();
        assert!(ack.is_success());
    }
}
