//! Session layer for the canal client.
//!
//! This crate is the protocol engine:
//!
//! 1. **Authentication**: the seed/password scramble ([`derive_token`])
//! 2. **Session state machine**: connect, handshake, subscribe,
//!    disconnect ([`Session`], [`SessionState`])
//! 3. **Batch consumption**: get / ack / rollback with per-batch ids,
//!    giving at-least-once delivery ([`Session::get_without_ack`])
//! 4. **Message decoding**: reply packet to [`Batch`], eagerly or lazily
//!    ([`decode_batch`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Caller (above)  ← consumes batches, decides when to ack or roll back
//!     ↕
//! Session Layer (this crate)  ← identity, lifecycle, request/reply pairing
//!     ↕
//! Transport Layer (below)  ← moves whole packets over TCP
//! ```
//!
//! # At-least-once delivery
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), canal_session::SessionError> {
//! use canal_session::{ClientConfig, Session};
//!
//! let mut session = Session::new(ClientConfig::default());
//! session.connect().await?;
//! session.handshake().await?;
//! session.subscribe(".*\\..*").await?;
//!
//! let batch = session.get_without_ack(100, None).await?;
//! if !batch.is_no_data() {
//!     // process batch.entries(), then:
//!     session.ack(batch.id()).await?;
//! }
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The server never confirms `ack` or `rollback`. A failed local write is
//! reported; a server that drops the request is not detectable.

mod auth;
mod batch;
mod config;
mod error;
mod session;

pub use auth::{derive_token, encode_password, TOKEN_LEN};
pub use batch::{decode_batch, Batch, NO_DATA_BATCH_ID, ROLLBACK_ALL};
pub use config::ClientConfig;
pub use error::SessionError;
pub use session::{Session, SessionIdentity, SessionState};
