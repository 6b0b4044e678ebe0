//! `CanalConnector` builder and the one-call connect sequence.
//!
//! The session layer exposes each lifecycle step separately. The connector
//! runs the usual sequence for you: dial → handshake → subscribe with the
//! configured filter → roll back batches a previous process left
//! unacknowledged.

use std::time::Duration;

use canal_session::{ClientConfig, Session, ROLLBACK_ALL};
use canal_transport::TransportMode;

use crate::CanalError;

/// Builder for a [`CanalConnector`].
///
/// # Example
///
/// ```rust,no_run
/// use canal::prelude::*;
///
/// # async fn run() -> Result<(), CanalError> {
/// let connector = CanalConnector::builder()
///     .address("127.0.0.1:11111")
///     .credentials("canal", "canal")
///     .destination("example")
///     .filter(".*\\..*")
///     .build();
/// let mut session = connector.connect().await?;
/// # session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct CanalConnectorBuilder {
    config: ClientConfig,
}

impl CanalConnectorBuilder {
    /// Creates a builder over the default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Sets the server's `host:port`.
    pub fn address(mut self, addr: &str) -> Self {
        self.config.address = addr.to_string();
        self
    }

    /// Sets the username and password. An empty password disables the
    /// scramble.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.config.username = username.to_string();
        self.config.password = password.to_string();
        self
    }

    pub fn destination(mut self, destination: &str) -> Self {
        self.config.destination = destination.to_string();
        self
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.config.client_id = client_id.to_string();
        self
    }

    /// Subscribes with `filter` as part of [`CanalConnector::connect`].
    pub fn filter(mut self, filter: &str) -> Self {
        self.config.filter = Some(filter.to_string());
        self
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Sets the idle read and write timeouts the server applies.
    pub fn idle_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.config.read_timeout = read;
        self.config.write_timeout = write;
        self
    }

    pub fn lazy_parse_entry(mut self, lazy: bool) -> Self {
        self.config.lazy_parse_entry = lazy;
        self
    }

    pub fn rollback_on_connect(mut self, enabled: bool) -> Self {
        self.config.rollback_on_connect = enabled;
        self
    }

    pub fn rollback_on_disconnect(mut self, enabled: bool) -> Self {
        self.config.rollback_on_disconnect = enabled;
        self
    }

    pub fn transport(mut self, mode: TransportMode) -> Self {
        self.config.transport = mode;
        self
    }

    pub fn max_frame_length(mut self, max: usize) -> Self {
        self.config.max_frame_length = max;
        self
    }

    pub fn default_fetch_size(mut self, size: i32) -> Self {
        self.config.default_fetch_size = size;
        self
    }

    /// Replaces everything set so far with `config`.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> CanalConnector {
        CanalConnector {
            config: self.config.validated(),
        }
    }
}

impl Default for CanalConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens ready-to-use sessions against one canal server.
///
/// A connector holds only configuration; every [`connect`](Self::connect)
/// opens a fresh, independent session.
#[derive(Debug, Clone)]
pub struct CanalConnector {
    config: ClientConfig,
}

impl CanalConnector {
    pub fn builder() -> CanalConnectorBuilder {
        CanalConnectorBuilder::new()
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    /// Parses a JSON [`ClientConfig`]. Missing fields take their defaults.
    ///
    /// # Errors
    /// [`CanalError::Config`] if the JSON doesn't match the config shape.
    pub fn from_json(json: &str) -> Result<Self, CanalError> {
        let config: ClientConfig = serde_json::from_str(json)?;
        Ok(Self::from_config(config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens a session and brings it to the point where batches can be
    /// fetched.
    ///
    /// Subscribes only when a filter is configured, and rolls back all
    /// outstanding batches when `rollback_on_connect` is set. If any step
    /// after dialing fails, the half-set-up session is disconnected before
    /// the error is returned.
    pub async fn connect(&self) -> Result<Session, CanalError> {
        let mut session = Session::new(self.config.clone());
        session.connect().await?;

        if let Err(e) = self.establish(&mut session).await {
            if let Err(close_err) = session.disconnect().await {
                tracing::warn!(error = %close_err, "disconnect after failed setup also failed");
            }
            return Err(e);
        }

        tracing::info!(
            address = %self.config.address,
            destination = %self.config.destination,
            client_id = %self.config.client_id,
            "canal session established"
        );
        Ok(session)
    }

    async fn establish(&self, session: &mut Session) -> Result<(), CanalError> {
        session.handshake().await?;
        if let Some(filter) = &self.config.filter {
            session.subscribe(filter).await?;
        }
        if self.config.rollback_on_connect {
            session.rollback(ROLLBACK_ALL).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let connector = CanalConnector::builder()
            .address("10.0.0.5:11111")
            .credentials("canal", "secret")
            .destination("orders")
            .client_id("2002")
            .filter("shop\\..*")
            .lazy_parse_entry(true)
            .rollback_on_connect(false)
            .transport(TransportMode::Pumped { queue_capacity: 8 })
            .build();

        let config = connector.config();
        assert_eq!(config.address, "10.0.0.5:11111");
        assert_eq!(config.username, "canal");
        assert_eq!(config.password, "secret");
        assert_eq!(config.destination, "orders");
        assert_eq!(config.client_id, "2002");
        assert_eq!(config.filter.as_deref(), Some("shop\\..*"));
        assert!(config.lazy_parse_entry);
        assert!(!config.rollback_on_connect);
        assert_eq!(config.transport, TransportMode::Pumped { queue_capacity: 8 });
    }

    #[test]
    fn test_build_validates_config() {
        let connector = CanalConnector::builder().default_fetch_size(0).build();
        assert_eq!(connector.config().default_fetch_size, 1000);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let connector = CanalConnector::from_json(
            r#"{"address": "db:11111", "destination": "orders", "transport": {"mode": "pumped", "queue_capacity": 16}}"#,
        )
        .unwrap();
        let config = connector.config();
        assert_eq!(config.address, "db:11111");
        assert_eq!(config.destination, "orders");
        assert_eq!(config.client_id, "1001");
        assert_eq!(config.transport, TransportMode::Pumped { queue_capacity: 16 });
    }

    #[test]
    fn test_from_json_rejects_bad_shape() {
        let err = CanalConnector::from_json(r#"{"address": 5}"#).unwrap_err();
        assert!(matches!(err, CanalError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let connector = CanalConnector::builder()
            .address("127.0.0.1:1")
            .dial_timeout(Duration::from_secs(2))
            .build();
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
