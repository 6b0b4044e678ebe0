//! Transport layer for the canal client.
//!
//! Provides the [`Connection`] trait the session drives, and two
//! implementations of it:
//!
//! - [`FramedConnection`]: the baseline half-duplex discipline. Each
//!   `send`/`recv` reads or writes the socket directly on the caller's task.
//! - [`PumpedConnection`]: a background reader task and writer task drain
//!   and fill bounded queues, so a slow write never waits behind a blocked
//!   read (or vice versa). It does **not** add request correlation: the
//!   session still issues one request and consumes its reply before the
//!   next.
//!
//! [`dial`] opens a TCP connection in the mode selected by
//! [`TransportMode`] and returns a [`ClientConnection`] wrapping either one.

#![allow(async_fn_in_trait)]

mod error;
mod framed;
mod pump;

pub use error::TransportError;
pub use framed::FramedConnection;
pub use pump::{PumpedConnection, CLOSE_DRAIN_TIMEOUT};

use std::time::Duration;

use canal_protocol::Packet;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

/// Default capacity of each pump queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A single connection to a canal server that exchanges whole packets.
///
/// Every method takes `&mut self`: a connection has exactly one owner, and
/// the borrow checker keeps that owner from starting a second exchange
/// while one is still in progress.
pub trait Connection: Send + 'static {
    /// Writes one packet to the server.
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Reads the next packet from the server.
    ///
    /// Blocks until a whole frame arrives or the stream fails. There is no
    /// client-side deadline.
    async fn recv(&mut self) -> Result<Packet, TransportError>;

    /// Closes the connection.
    ///
    /// Idempotent: closing an already closed connection returns `Ok(())`
    /// without touching the socket.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Returns `true` once [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;
}

/// How a dialed connection moves frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TransportMode {
    /// Read and write the socket directly on the caller's task.
    #[default]
    Direct,

    /// Run a background reader and writer connected by bounded queues.
    Pumped {
        /// Capacity of each direction's queue.
        queue_capacity: usize,
    },
}

/// A dialed TCP connection in either transport mode.
pub enum ClientConnection {
    Direct(FramedConnection<TcpStream>),
    Pumped(PumpedConnection<TcpStream>),
}

impl Connection for ClientConnection {
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        match self {
            Self::Direct(conn) => conn.send(packet).await,
            Self::Pumped(conn) => conn.send(packet).await,
        }
    }

    async fn recv(&mut self) -> Result<Packet, TransportError> {
        match self {
            Self::Direct(conn) => conn.recv().await,
            Self::Pumped(conn) => conn.recv().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Direct(conn) => conn.close().await,
            Self::Pumped(conn) => conn.close().await,
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Self::Direct(conn) => conn.is_closed(),
            Self::Pumped(conn) => conn.is_closed(),
        }
    }
}

/// Opens a TCP connection to `addr`, giving up after `dial_timeout`.
///
/// # Errors
/// - [`TransportError::DialTimeout`] if the connect doesn't finish in time.
/// - [`TransportError::Connect`] if the connect itself fails.
pub async fn dial(
    addr: &str,
    dial_timeout: Duration,
    mode: TransportMode,
    max_frame_length: usize,
) -> Result<ClientConnection, TransportError> {
    let stream = tokio::time::timeout(dial_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::DialTimeout {
            addr: addr.to_string(),
            timeout: dial_timeout,
        })?
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    stream.set_nodelay(true).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;

    tracing::debug!(addr, ?mode, "dialed canal server");

    Ok(match mode {
        TransportMode::Direct => ClientConnection::Direct(
            FramedConnection::new(stream, max_frame_length),
        ),
        TransportMode::Pumped { queue_capacity } => ClientConnection::Pumped(
            PumpedConnection::spawn(stream, queue_capacity, max_frame_length),
        ),
    })
}
