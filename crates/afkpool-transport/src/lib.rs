//! Protocol client seam for afkpool.
//!
//! The game server's wire protocol lives outside this workspace. This
//! crate defines the two traits the session layer talks to instead:
//!
//! - [`Connector`]: opens one game connection for an identity, through
//!   an optional egress [`ProxyEndpoint`].
//! - [`GameClient`]: the handle to that connection: queue chat, disconnect.
//!
//! Lifecycle events (auth challenge, spawn, error, close) flow back through
//! the [`EventSender`] carried in the [`ConnectRequest`].
//!
//! # Feature Flags
//!
//! - `gateway` (default): [`GatewayConnector`], which drives a protocol
//!   gateway over WebSocket, optionally tunnelled through an HTTP proxy.

mod error;
mod proxy;
#[cfg(feature = "gateway")]
mod gateway;
#[cfg(feature = "gateway")]
mod tunnel;

pub use error::TransportError;
pub use proxy::{ProxyAddr, ProxyEndpoint};
#[cfg(feature = "gateway")]
pub use gateway::{GatewayClient, GatewayConfig, GatewayConnector};

use std::future::Future;
use std::path::PathBuf;

use afkpool_protocol::{ClientEvent, Identity, TextPacket};
use tokio::sync::mpsc;

/// Where a connection reports its lifecycle events.
///
/// Unbounded because the protocol client must never block on a slow
/// session actor; events per connection are few.
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Everything a [`Connector`] needs to open one connection.
#[derive(Debug)]
pub struct ConnectRequest {
    /// Whose session this is.
    pub identity: Identity,
    /// Folder holding this identity's cached auth material. The auth
    /// flow owns its contents.
    pub profile_dir: PathBuf,
    /// Egress proxy, or `None` for a direct connection.
    pub proxy: Option<ProxyEndpoint>,
    /// Sink for this attempt's lifecycle events.
    pub events: EventSender,
}

/// A live game connection.
///
/// Both methods enqueue and return immediately; delivery happens on the
/// connection's own task.
pub trait GameClient: Send + Sync + 'static {
    /// Queues a text packet.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the connection is
    /// already gone.
    fn send_text(&self, packet: TextPacket) -> Result<(), TransportError>;

    /// Closes the connection. Safe to call more than once.
    fn disconnect(&self);
}

/// Opens game connections.
///
/// `connect` resolves once the client object exists ("construction").
/// Authentication and the spawn handshake continue afterwards and are
/// reported as [`ClientEvent`]s on `request.events`.
pub trait Connector: Send + Sync + 'static {
    /// The client handle this connector produces.
    type Client: GameClient;

    /// Constructs a connection for `request.identity`.
    ///
    /// # Errors
    /// Construction failures: malformed or unreachable proxy, gateway
    /// handshake failure, and so on.
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> impl Future<Output = Result<Self::Client, TransportError>> + Send;
}
