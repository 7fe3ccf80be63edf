use afkpool_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The proxy URL could not be used.
    #[error("invalid proxy {0}")]
    InvalidProxy(String),

    /// The gateway URL could not be used.
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),

    /// Opening a TCP connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The proxy answered the CONNECT request with something other than 2xx.
    #[error("proxy refused tunnel: {0}")]
    ProxyRejected(String),

    /// The WebSocket handshake with the gateway failed.
    #[error("gateway handshake failed: {0}")]
    Handshake(String),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
