//! # afkpool
//!
//! Keeps a pool of game accounts logged in to one server and exposes an
//! HTTP control surface to manage them.
//!
//! The layers, bottom up:
//!
//! - `afkpool-protocol`: identities, session states, gateway messages
//! - `afkpool-transport`: the [`Connector`](afkpool_transport::Connector)
//!   seam and the WebSocket gateway connector
//! - `afkpool-reconnect`: per-identity reconnect timers
//! - `afkpool-session`: session actors and the registry
//! - this crate: configuration, the stats client, log capture, the
//!   control surface, and the `afkpool` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use afkpool::prelude::*;
//!
//! # async fn start() -> Result<(), AfkpoolError> {
//! let config = AfkpoolConfig::load(None)?;
//! let logs = LogBuffer::new(config.log_capacity);
//! let server = AfkpoolServer::from_config(&config, logs).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod control;
mod error;
pub mod logs;
mod server;
pub mod stats;

pub use config::{AfkpoolConfig, ConfigError};
pub use error::AfkpoolError;
pub use logs::{CaptureLayer, LogBuffer};
pub use server::AfkpoolServer;
pub use stats::HttpStatsClient;

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{AfkpoolConfig, AfkpoolError, AfkpoolServer, HttpStatsClient, LogBuffer};
    pub use afkpool_protocol::{Identity, SessionSnapshot, SessionState};
    pub use afkpool_session::{
        AuthStore, ProxyPool, SessionConfig, SessionError, SessionRegistry, StatsLookup,
    };
    pub use afkpool_transport::{Connector, GameClient, GatewayConnector, ProxyEndpoint};
}
