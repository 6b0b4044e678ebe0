//! The session state machine and the batch consumption protocol.
//!
//! A [`Session`] owns exactly one connection and drives it through:
//!
//! ```text
//! Disconnected ─connect()─→ Connecting ─→ AwaitingHandshake
//!                                               │ handshake()
//!                                               ▼
//!                                         Authenticating ──(rejected)──→ AwaitingHandshake
//!                                               │
//!                                               ▼
//!                   Ready ←─unsubscribe()─ Subscribed
//!                     └──────subscribe()──────↑
//!
//! any state ─disconnect()─→ Closed
//! ```
//!
//! # Exchanges
//!
//! Every request is one outbound frame followed by exactly one inbound
//! frame, except `ack` and `rollback`, which have no reply. The protocol
//! has no correlation ids, so a second request must never be sent before
//! the first one's reply is consumed. All operations take `&mut self`,
//! which makes pipelining on one session impossible to express.
//!
//! # Failure
//!
//! Transport and framing errors are fatal: the session closes its
//! connection and moves to `Closed` before returning them. Rejections
//! (bad credentials, refused subscription, a server error ack) leave the
//! connection usable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use canal_protocol::{
    decode_message, Ack, ClientAck, ClientAuth, ClientRollback, Get,
    Handshake, Packet, PacketType, Sub, TimeUnit, Unsub, PROTOCOL_VERSION,
};
use canal_transport::{dial, ClientConnection, Connection};

use crate::auth::encode_password;
use crate::batch::{decode_batch, Batch, NO_DATA_BATCH_ID, ROLLBACK_ALL};
use crate::{ClientConfig, SessionError};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no connection yet.
    Disconnected,
    /// Dialing the server.
    Connecting,
    /// Connected; the server's handshake hasn't been processed.
    AwaitingHandshake,
    /// Credentials sent, waiting for the verdict.
    Authenticating,
    /// Authenticated, no subscription.
    Ready,
    /// Authenticated and subscribed.
    Subscribed,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` once authentication has succeeded and until close.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Ready | Self::Subscribed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHandshake => "AwaitingHandshake",
            Self::Authenticating => "Authenticating",
            Self::Ready => "Ready",
            Self::Subscribed => "Subscribed",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// SessionIdentity
// ---------------------------------------------------------------------------

/// Who this session is to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub destination: String,
    pub client_id: String,
    /// Set by a successful subscribe, cleared by unsubscribe.
    pub filter: Option<String>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A client session with one canal server.
///
/// Generic over the [`Connection`] so tests can run it over in-memory
/// streams; the default is the dialed [`ClientConnection`].
pub struct Session<C: Connection = ClientConnection> {
    config: Arc<ClientConfig>,
    identity: SessionIdentity,
    state: SessionState,
    /// `None` before connect and after close.
    conn: Option<C>,
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("address", &self.config.address)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl Session<ClientConnection> {
    /// Creates a disconnected session. Call [`connect`](Self::connect) next.
    pub fn new(config: ClientConfig) -> Self {
        let config = config.validated();
        Self {
            identity: identity_of(&config),
            config: Arc::new(config),
            state: SessionState::Disconnected,
            conn: None,
        }
    }

    /// Dials the configured address within `dial_timeout`.
    ///
    /// On failure the session returns to `Disconnected`, so the caller may
    /// try again; nothing here retries on its own.
    ///
    /// # Errors
    /// [`SessionError::Transport`] if the dial fails or times out.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.expect_state("connect", &[SessionState::Disconnected])?;
        self.transition(SessionState::Connecting);

        let dialed = dial(
            &self.config.address,
            self.config.dial_timeout,
            self.config.transport,
            self.config.max_frame_length,
        )
        .await;

        match dialed {
            Ok(conn) => {
                self.conn = Some(conn);
                self.transition(SessionState::AwaitingHandshake);
                tracing::info!(address = %self.config.address, "connected to canal server");
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Disconnected);
                Err(SessionError::Transport(e))
            }
        }
    }
}

impl<C: Connection> Session<C> {
    /// Wraps an already established connection. The session starts in
    /// `AwaitingHandshake`.
    pub fn with_connection(config: ClientConfig, conn: C) -> Self {
        let config = config.validated();
        Self {
            identity: identity_of(&config),
            config: Arc::new(config),
            state: SessionState::AwaitingHandshake,
            conn: Some(conn),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- Handshake --

    /// Authenticates against the server's handshake.
    ///
    /// Reads the server's handshake, derives the password token from its
    /// seed, sends the configured username, token and read/write timeouts,
    /// and checks the server's ack.
    ///
    /// # Errors
    /// - [`SessionError::UnsupportedVersion`] if a packet isn't version 1.
    /// - [`SessionError::Protocol`] if the first packet isn't a handshake.
    /// - [`SessionError::UnexpectedPacket`] if the reply isn't an ack.
    /// - [`SessionError::MalformedHandshake`] if either server packet has
    ///   a body that doesn't decode.
    ///
    /// All of the above close the session.
    ///
    /// [`SessionError::Authentication`] means the server rejected the
    /// credentials; the session goes back to `AwaitingHandshake`.
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        self.expect_state("handshake", &[SessionState::AwaitingHandshake])?;

        let packet = self.recv().await?;
        if packet.kind() != Ok(PacketType::Handshake) {
            let err = SessionError::Protocol {
                expected: PacketType::Handshake,
                found: packet.r#type,
            };
            return Err(self.abort(err).await);
        }
        let handshake: Handshake = match decode_message(&packet.body) {
            Ok(handshake) => handshake,
            Err(e) => return Err(self.abort(SessionError::MalformedHandshake(e)).await),
        };

        self.transition(SessionState::Authenticating);
        let auth = ClientAuth {
            username: self.config.username.clone(),
            password: encode_password(&self.config.password, &handshake.seeds),
            net_read_timeout: Some(self.config.read_timeout_secs()),
            net_write_timeout: Some(self.config.write_timeout_secs()),
            ..ClientAuth::default()
        };
        self.send(Packet::wrap(PacketType::ClientAuthentication, &auth))
            .await?;

        let packet = self.recv().await?;
        if packet.kind() != Ok(PacketType::Ack) {
            let err = SessionError::UnexpectedPacket {
                packet_type: packet.r#type,
            };
            return Err(self.abort(err).await);
        }
        let ack: Ack = match decode_message(&packet.body) {
            Ok(ack) => ack,
            Err(e) => return Err(self.abort(SessionError::MalformedHandshake(e)).await),
        };
        if !ack.is_success() {
            self.transition(SessionState::AwaitingHandshake);
            tracing::warn!(code = ack.code(), message = %ack.error_message, "authentication rejected");
            return Err(SessionError::Authentication {
                code: ack.code(),
                message: ack.error_message,
            });
        }

        self.transition(SessionState::Ready);
        tracing::info!(username = %self.config.username, "authenticated");
        Ok(())
    }

    // -- Subscription --

    /// Subscribes to the destination with `filter`.
    ///
    /// # Errors
    /// [`SessionError::Subscription`] if the server refuses.
    pub async fn subscribe(&mut self, filter: &str) -> Result<(), SessionError> {
        self.expect_state("subscribe", &[SessionState::Ready, SessionState::Subscribed])?;

        let sub = Sub {
            destination: self.identity.destination.clone(),
            client_id: self.identity.client_id.clone(),
            filter: filter.to_string(),
        };
        self.send(Packet::wrap(PacketType::Subscription, &sub)).await?;
        self.expect_ack().await.map_err(subscription_error)?;

        self.identity.filter = Some(filter.to_string());
        self.transition(SessionState::Subscribed);
        tracing::info!(
            destination = %self.identity.destination,
            client_id = %self.identity.client_id,
            filter,
            "subscribed"
        );
        Ok(())
    }

    /// Cancels the current subscription, sending the stored filter.
    ///
    /// # Errors
    /// [`SessionError::Subscription`] if the server refuses.
    pub async fn unsubscribe(&mut self) -> Result<(), SessionError> {
        self.expect_state("unsubscribe", &[SessionState::Ready, SessionState::Subscribed])?;

        let unsub = Unsub {
            destination: self.identity.destination.clone(),
            client_id: self.identity.client_id.clone(),
            filter: self.identity.filter.clone().unwrap_or_default(),
        };
        self.send(Packet::wrap(PacketType::Unsubscription, &unsub))
            .await?;
        self.expect_ack().await.map_err(subscription_error)?;

        self.identity.filter = None;
        self.transition(SessionState::Ready);
        tracing::info!(destination = %self.identity.destination, "unsubscribed");
        Ok(())
    }

    // -- Batch consumption --

    /// Fetches a batch and acknowledges it immediately.
    ///
    /// The "no data" sentinel is returned without an ack. Every other batch
    /// is already committed server-side when this returns, so a failure
    /// to process it can't be undone with [`rollback`](Self::rollback).
    /// Use [`get_without_ack`](Self::get_without_ack) for that.
    pub async fn get(
        &mut self,
        batch_size: i32,
        timeout: Option<Duration>,
    ) -> Result<Batch, SessionError> {
        let batch = self.get_without_ack(batch_size, timeout).await?;
        if !batch.is_no_data() {
            self.ack(batch.id()).await?;
        }
        Ok(batch)
    }

    /// Fetches a batch without acknowledging it.
    ///
    /// `batch_size` of 0 or less uses the configured default. `timeout` is
    /// passed to the server, not enforced locally: `None` waits for data
    /// indefinitely, `Some(Duration::ZERO)` returns whatever is available
    /// right away. The local read always waits for the server's reply.
    ///
    /// # Errors
    /// - [`SessionError::Server`] if the server answers with an error ack.
    /// - [`SessionError::UnsupportedCompression`] /
    ///   [`SessionError::Decode`] if the batch can't be read; no partial
    ///   batch is ever returned.
    /// - [`SessionError::UnexpectedPacket`] if the reply is neither a batch
    ///   nor an ack. The session closes.
    pub async fn get_without_ack(
        &mut self,
        batch_size: i32,
        timeout: Option<Duration>,
    ) -> Result<Batch, SessionError> {
        self.expect_state("get", &[SessionState::Ready, SessionState::Subscribed])?;

        let fetch_size = if batch_size <= 0 {
            self.config.default_fetch_size
        } else {
            batch_size
        };
        let get = Get {
            destination: self.identity.destination.clone(),
            client_id: self.identity.client_id.clone(),
            fetch_size,
            timeout: Some(wire_timeout(timeout)),
            unit: Some(TimeUnit::Milliseconds as i32),
            auto_ack: Some(false),
        };
        self.send(Packet::wrap(PacketType::Get, &get)).await?;

        let packet = self.recv().await?;
        let batch = match decode_batch(packet, self.config.lazy_parse_entry) {
            Ok(batch) => batch,
            Err(e @ SessionError::UnexpectedPacket { .. }) => return Err(self.abort(e).await),
            Err(e) => return Err(e),
        };
        tracing::debug!(
            batch_id = batch.id(),
            entries = batch.len(),
            raw = batch.is_raw(),
            "received batch"
        );
        Ok(batch)
    }

    /// Acknowledges `batch_id`.
    ///
    /// Fire-and-forget: the server sends no reply, so only a failed local
    /// write is observable. Acking the "no data" sentinel is a no-op.
    pub async fn ack(&mut self, batch_id: i64) -> Result<(), SessionError> {
        self.expect_state("ack", &[SessionState::Ready, SessionState::Subscribed])?;
        if batch_id == NO_DATA_BATCH_ID {
            tracing::debug!("skipping ack of empty batch");
            return Ok(());
        }

        let ack = ClientAck {
            destination: self.identity.destination.clone(),
            client_id: self.identity.client_id.clone(),
            batch_id,
        };
        self.send(Packet::wrap(PacketType::ClientAck, &ack)).await?;
        tracing::debug!(batch_id, "acked batch");
        Ok(())
    }

    /// Rolls back `batch_id` so the server redelivers it, or every
    /// outstanding batch when `batch_id` is [`ROLLBACK_ALL`].
    ///
    /// Same fire-and-forget contract as [`ack`](Self::ack).
    pub async fn rollback(&mut self, batch_id: i64) -> Result<(), SessionError> {
        self.expect_state("rollback", &[SessionState::Ready, SessionState::Subscribed])?;
        if batch_id == NO_DATA_BATCH_ID {
            tracing::debug!("skipping rollback of empty batch");
            return Ok(());
        }

        let rollback = ClientRollback {
            destination: self.identity.destination.clone(),
            client_id: self.identity.client_id.clone(),
            batch_id,
        };
        self.send(Packet::wrap(PacketType::ClientRollback, &rollback))
            .await?;
        if batch_id == ROLLBACK_ALL {
            tracing::debug!("rolled back all outstanding batches");
        } else {
            tracing::debug!(batch_id, "rolled back batch");
        }
        Ok(())
    }

    // -- Close --

    /// Closes the session.
    ///
    /// With `rollback_on_disconnect`, an authenticated session first rolls
    /// back every outstanding batch. The connection is closed whether or
    /// not that succeeds; the first error is returned. Calling this on a
    /// closed session does nothing.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let mut first_err = None;
        if self.config.rollback_on_disconnect && self.state.is_authenticated() {
            if let Err(e) = self.rollback(ROLLBACK_ALL).await {
                tracing::warn!(error = %e, "rollback on disconnect failed");
                first_err = Some(e);
            }
        }

        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "closing connection failed");
                first_err.get_or_insert(SessionError::Transport(e));
            }
        }
        self.transition(SessionState::Closed);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -- Internals --

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    async fn send(&mut self, packet: Packet) -> Result<(), SessionError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::InvalidState {
                operation: "send",
                state: self.state,
            });
        };
        let result = conn.send(&packet).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Reads one packet and checks its version.
    async fn recv(&mut self) -> Result<Packet, SessionError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::InvalidState {
                operation: "receive",
                state: self.state,
            });
        };
        let result = conn.recv().await;
        let packet = match result {
            Ok(packet) => packet,
            Err(e) => return Err(self.abort(e.into()).await),
        };

        let version = packet.effective_version();
        if version != PROTOCOL_VERSION {
            return Err(self.abort(SessionError::UnsupportedVersion { version }).await);
        }
        Ok(packet)
    }

    /// Reads a reply that must be a successful ack.
    ///
    /// A non-ack reply is [`SessionError::UnexpectedPacket`] and closes the
    /// session; a failed ack is [`SessionError::Server`], which callers
    /// re-label.
    async fn expect_ack(&mut self) -> Result<(), SessionError> {
        let packet = self.recv().await?;
        if packet.kind() != Ok(PacketType::Ack) {
            let err = SessionError::UnexpectedPacket {
                packet_type: packet.r#type,
            };
            return Err(self.abort(err).await);
        }
        let ack: Ack = decode_message(&packet.body).map_err(SessionError::Decode)?;
        if !ack.is_success() {
            return Err(SessionError::Server {
                code: ack.code(),
                message: ack.error_message,
            });
        }
        Ok(())
    }

    /// Closes the connection after a failure the session can't continue
    /// past, and hands the error back for returning.
    async fn abort(&mut self, err: SessionError) -> SessionError {
        tracing::warn!(error = %err, state = %self.state, "closing session after failure");
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "close after failure also failed");
            }
        }
        self.transition(SessionState::Closed);
        err
    }
}

fn identity_of(config: &ClientConfig) -> SessionIdentity {
    SessionIdentity {
        destination: config.destination.clone(),
        client_id: config.client_id.clone(),
        filter: None,
    }
}

fn subscription_error(err: SessionError) -> SessionError {
    match err {
        SessionError::Server { code, message } => {
            SessionError::Subscription { code, message }
        }
        other => other,
    }
}

/// `None` is the server's "wait indefinitely" value, -1. Non-zero
/// durations round up to whole milliseconds so they never become 0.
fn wire_timeout(timeout: Option<Duration>) -> i64 {
    match timeout {
        None => -1,
        Some(d) => i64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_timeout_keeps_zero_and_indefinite_apart() {
        assert_eq!(wire_timeout(None), -1);
        assert_eq!(wire_timeout(Some(Duration::ZERO)), 0);
        assert_eq!(wire_timeout(Some(Duration::from_secs(2))), 2_000);
    }

    #[test]
    fn test_wire_timeout_never_rounds_a_wait_down_to_zero() {
        assert_eq!(wire_timeout(Some(Duration::from_micros(500))), 1);
        assert_eq!(wire_timeout(Some(Duration::from_nanos(1))), 1);
        assert_eq!(wire_timeout(Some(Duration::from_micros(1_500))), 2);
        assert_eq!(wire_timeout(Some(Duration::MAX)), i64::MAX);
    }

    #[test]
    fn test_debug_shows_state_and_identity() {
        let session = Session::new(ClientConfig::default());
        let debug = format!("{session:?}");
        assert!(debug.contains("Disconnected"));
        assert!(debug.contains("example"));
        assert!(debug.contains("connected: false"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::AwaitingHandshake.to_string(), "AwaitingHandshake");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_authenticated_states() {
        assert!(SessionState::Ready.is_authenticated());
        assert!(SessionState::Subscribed.is_authenticated());
        assert!(!SessionState::Authenticating.is_authenticated());
        assert!(!SessionState::Closed.is_authenticated());
    }

    #[test]
    fn test_subscription_error_relabels_server_error() {
        let err = subscription_error(SessionError::Server {
            code: 2,
            message: "bad filter".into(),
        });
        assert!(matches!(err, SessionError::Subscription { code: 2, .. }));
    }

    #[tokio::test]
    async fn test_new_session_starts_disconnected() {
        let session = Session::new(ClientConfig::default());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.identity().filter, None);
        assert_eq!(session.identity().destination, "example");
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        // Port 1 on loopback refuses connections.
        let mut session = Session::new(ClientConfig {
            address: "127.0.0.1:1".into(),
            dial_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        });
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_before_connect_are_rejected() {
        let mut session = Session::new(ClientConfig::default());
        let err = session.get_without_ack(10, None).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                operation: "get",
                state: SessionState::Disconnected
            }
        ));
    }
}
