//! Client configuration.

use std::fmt;
use std::time::Duration;

use canal_protocol::DEFAULT_MAX_FRAME_LENGTH;
use canal_transport::TransportMode;
use serde::{Deserialize, Serialize};

/// Everything a [`Session`](crate::Session) needs, fixed at construction.
///
/// Build one with struct-update syntax over [`Default`], or deserialize it
/// from JSON (every field is optional there). The session keeps it behind
/// an `Arc` and never mutates it.
///
/// ```rust
/// use canal_session::ClientConfig;
///
/// let config = ClientConfig {
///     address: "10.0.0.5:11111".into(),
///     destination: "orders".into(),
///     ..ClientConfig::default()
/// };
/// assert_eq!(config.client_id, "1001");
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the canal server.
    pub address: String,

    pub username: String,

    /// Empty means the server doesn't require authentication.
    pub password: String,

    /// Name of the change stream to consume.
    pub destination: String,

    /// Identifies this consumer to the server. Batches are tracked per
    /// `(destination, client_id)`.
    pub client_id: String,

    /// Subscription filter applied by the connector after authenticating.
    /// `None` leaves the connected session unsubscribed.
    pub filter: Option<String>,

    /// Upper bound on establishing the TCP connection.
    pub dial_timeout: Duration,

    /// Idle read timeout the server applies to this connection. Sent in
    /// whole seconds during authentication.
    pub read_timeout: Duration,

    /// Idle write timeout the server applies to this connection. Sent in
    /// whole seconds during authentication.
    pub write_timeout: Duration,

    /// Return entries as raw payloads instead of decoding them.
    pub lazy_parse_entry: bool,

    /// Roll back every outstanding batch right after connecting, so
    /// batches a previous process never acked are redelivered.
    pub rollback_on_connect: bool,

    /// Roll back every outstanding batch before closing the connection.
    pub rollback_on_disconnect: bool,

    /// Largest inbound frame body accepted, in bytes.
    pub max_frame_length: usize,

    /// Direct or pumped socket I/O.
    pub transport: TransportMode,

    /// Fetch size used when a caller asks for a batch size of 0 or less.
    pub default_fetch_size: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:11111".into(),
            username: String::new(),
            password: String::new(),
            destination: "example".into(),
            client_id: "1001".into(),
            filter: None,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(60),
            lazy_parse_entry: false,
            rollback_on_connect: true,
            rollback_on_disconnect: false,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            transport: TransportMode::Direct,
            default_fetch_size: 1000,
        }
    }
}

impl ClientConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`Session::new`](crate::Session::new). Rules:
    /// - `default_fetch_size` of 0 or less falls back to 1000.
    /// - A pumped `queue_capacity` of 0 becomes 1.
    /// - `max_frame_length` of 0 falls back to the 16 MiB default.
    pub fn validated(mut self) -> Self {
        if self.default_fetch_size <= 0 {
            tracing::warn!(
                size = self.default_fetch_size,
                "default_fetch_size must be positive, using 1000"
            );
            self.default_fetch_size = 1000;
        }
        if let TransportMode::Pumped { queue_capacity } = &mut self.transport {
            if *queue_capacity == 0 {
                *queue_capacity = 1;
            }
        }
        if self.max_frame_length == 0 {
            self.max_frame_length = DEFAULT_MAX_FRAME_LENGTH;
        }
        self
    }

    /// `read_timeout` in whole seconds, saturated to `i32`.
    pub fn read_timeout_secs(&self) -> i32 {
        whole_secs(self.read_timeout)
    }

    /// `write_timeout` in whole seconds, saturated to `i32`.
    pub fn write_timeout_secs(&self) -> i32 {
        whole_secs(self.write_timeout)
    }
}

fn whole_secs(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("destination", &self.destination)
            .field("client_id", &self.client_id)
            .field("filter", &self.filter)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("lazy_parse_entry", &self.lazy_parse_entry)
            .field("rollback_on_connect", &self.rollback_on_connect)
            .field("rollback_on_disconnect", &self.rollback_on_disconnect)
            .field("max_frame_length", &self.max_frame_length)
            .field("transport", &self.transport)
            .field("default_fetch_size", &self.default_fetch_size)
            .finish()
    }
}
