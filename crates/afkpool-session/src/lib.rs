//! Session lifecycle for afkpool.
//!
//! Each registered identity gets its own actor task that owns the
//! session's state and live connection (see [`SessionHandle`]). The
//! [`SessionRegistry`] creates those actors, assigns each a proxy from
//! the [`ProxyPool`], and routes control commands to them.
//!
//! # Key types
//!
//! - [`SessionRegistry`]: add, connect, disconnect, remove, chat, status
//! - [`SessionHandle`]: commands for one running session
//! - [`SessionRecord`]: what the control surface sees about a session
//! - [`AuthStore`]: per-identity credential folders
//! - [`StatsLookup`]: the balance lookup seam

mod actor;
mod auth_store;
mod config;
mod error;
mod proxy;
mod record;
mod registry;
mod stats;

pub use actor::SessionHandle;
pub use auth_store::AuthStore;
pub use config::SessionConfig;
pub use error::SessionError;
pub use proxy::{DIRECT_LABEL, ProxyPool};
pub use record::SessionRecord;
pub use registry::SessionRegistry;
pub use stats::{DEFAULT_BALANCE, StatsLookup};

pub use afkpool_reconnect::{PendingReconnect, ReconnectConfig, ReconnectTier};
