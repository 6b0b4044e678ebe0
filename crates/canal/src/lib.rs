//! # canal
//!
//! Async client for the canal database change-stream server.
//!
//! A canal server tails a database's replication log and serves the row
//! changes to clients in numbered batches. This crate dials the server,
//! authenticates, subscribes, and hands out those batches; the caller
//! acknowledges each one after processing it or rolls it back to have it
//! redelivered.
//!
//! The work is split across layered crates, re-exported here:
//!
//! - `canal-protocol`: packet schema, protobuf codec, length-prefixed frames
//! - `canal-transport`: direct and pumped TCP connections
//! - `canal-session`: authentication, session state machine, batches
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use canal::prelude::*;
//!
//! # async fn run() -> Result<(), CanalError> {
//! let mut session = CanalConnector::builder()
//!     .address("127.0.0.1:11111")
//!     .destination("example")
//!     .filter(".*\\..*")
//!     .build()
//!     .connect()
//!     .await?;
//!
//! loop {
//!     let batch = session
//!         .get_without_ack(100, Some(Duration::from_secs(1)))
//!         .await?;
//!     if batch.is_no_data() {
//!         continue;
//!     }
//!     for entry in batch.entries() {
//!         println!("{:?}", entry.header);
//!     }
//!     session.ack(batch.id()).await?;
//! }
//! # }
//! ```

mod connector;
mod error;
mod logging;

pub use connector::{CanalConnector, CanalConnectorBuilder};
pub use error::CanalError;
pub use logging::init_tracing;

pub use canal_protocol as protocol;
pub use canal_session as session;
pub use canal_transport as transport;

/// Everything a typical consumer needs.
pub mod prelude {
    pub use crate::{init_tracing, CanalConnector, CanalConnectorBuilder, CanalError};
    pub use canal_protocol::{
        Column, Entry, EntryType, EventType, Header, RowChange, RowData,
    };
    pub use canal_session::{
        Batch, ClientConfig, Session, SessionError, SessionState, NO_DATA_BATCH_ID,
        ROLLBACK_ALL,
    };
    pub use canal_transport::TransportMode;
}
