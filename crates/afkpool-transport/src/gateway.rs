//! [`Connector`] implementation that drives a protocol gateway over WebSocket.
//!
//! The gateway is a sidecar that implements the game's wire protocol and
//! device-code login. afkpool opens one WebSocket per session, sends a
//! `connect` request, and from then on reads [`ClientEvent`]s and writes
//! [`GatewayRequest`]s as JSON text frames.

use afkpool_protocol::{ClientEvent, Codec, GatewayRequest, JsonCodec, TextPacket};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::proxy::bare_host;
use crate::{ConnectRequest, Connector, GameClient, TransportError, tunnel};

/// Where the gateway lives and which game server it should join.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `ws://` or `wss://` URL of the gateway.
    pub url: String,
    /// Game server host the gateway should connect to.
    pub server_host: String,
    /// Game server port.
    pub server_port: u16,
}

impl GatewayConfig {
    /// Host and port of the gateway, from its URL. IPv6 hosts come back
    /// without brackets.
    fn addr(&self) -> Result<(String, u16), TransportError> {
        let invalid = |why: &str| TransportError::InvalidUrl(format!("{}: {why}", self.url));
        let url = Url::parse(&self.url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid("expected ws:// or wss://"));
        }
        let host = bare_host(&url).ok_or_else(|| invalid("missing host"))?;
        let port = url.port_or_known_default().ok_or_else(|| invalid("bad port"))?;
        Ok((host, port))
    }
}

/// Opens gateway connections.
#[derive(Debug, Clone)]
pub struct GatewayConnector {
    config: GatewayConfig,
    codec: JsonCodec,
}

impl GatewayConnector {
    pub fn new(config: GatewayConfig) -> Self {
        // wss:// handshakes need a process-wide rustls provider.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            config,
            codec: JsonCodec,
        }
    }
}

impl Connector for GatewayConnector {
    type Client = GatewayClient;

    async fn connect(&self, request: ConnectRequest) -> Result<GatewayClient, TransportError> {
        let (host, port) = self.config.addr()?;

        let stream = match &request.proxy {
            Some(proxy) => tunnel::connect_via(proxy, &host, port).await?,
            None => TcpStream::connect((host.as_str(), port))
                .await
                .map_err(TransportError::ConnectFailed)?,
        };

        let (ws, _) = tokio_tungstenite::client_async_tls(self.config.url.as_str(), stream)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        let (mut sink, mut incoming) = ws.split();

        let hello = GatewayRequest::Connect {
            identity: request.identity.clone(),
            host: self.config.server_host.clone(),
            port: self.config.server_port,
            profiles_folder: request.profile_dir.display().to_string(),
        };
        sink.send(text_frame(&self.codec.encode(&hello)?))
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        tracing::debug!(identity = %request.identity, gateway = %self.config.url, "gateway connection opened");

        // Writer: drains queued requests until Disconnect or every
        // client handle is dropped, then closes the socket.
        let (outbound, mut queued) = mpsc::unbounded_channel::<GatewayRequest>();
        let codec = self.codec;
        let identity = request.identity.clone();
        tokio::spawn(async move {
            while let Some(req) = queued.recv().await {
                let closing = matches!(req, GatewayRequest::Disconnect);
                match codec.encode(&req) {
                    Ok(bytes) => {
                        if let Err(e) = sink.send(text_frame(&bytes)).await {
                            tracing::debug!(%identity, error = %e, "gateway send failed");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(%identity, error = %e, "dropping unencodable request"),
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards events until the socket ends, then reports
        // how it ended. Stops early if nobody is listening any more.
        let events = request.events;
        let codec = self.codec;
        let identity = request.identity;
        tokio::spawn(async move {
            let last = loop {
                let data = match incoming.next().await {
                    Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Close(frame))) => {
                        break ClientEvent::Closed {
                            reason: frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty()),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break ClientEvent::Error { reason: e.to_string() },
                    None => break ClientEvent::Closed { reason: None },
                };

                match codec.decode::<ClientEvent>(&data) {
                    Ok(event) => {
                        tracing::trace!(%identity, ?event, "gateway event");
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::debug!(%identity, error = %e, "ignoring undecodable gateway frame"),
                }
            };
            let _ = events.send(last);
        });

        Ok(GatewayClient { outbound })
    }
}

/// Handle to one gateway connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct GatewayClient {
    outbound: mpsc::UnboundedSender<GatewayRequest>,
}

impl GameClient for GatewayClient {
    fn send_text(&self, packet: TextPacket) -> Result<(), TransportError> {
        self.outbound
            .send(GatewayRequest::Text(packet))
            .map_err(|_| TransportError::ConnectionClosed("gateway connection is gone".into()))
    }

    fn disconnect(&self) {
        let _ = self.outbound.send(GatewayRequest::Disconnect);
    }
}

fn text_frame(bytes: &[u8]) -> Message {
    Message::Text(String::from_utf8_lossy(bytes).into_owned().into())
}
