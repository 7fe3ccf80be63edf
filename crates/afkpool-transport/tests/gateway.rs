//! Integration tests for the gateway connector.
//!
//! Each test spins up a real in-process WebSocket "gateway" on an
//! OS-assigned port (and, for the proxy test, a tiny CONNECT proxy in
//! front of it) and drives the connector against it.

#[cfg(feature = "gateway")]
mod gateway {
    use std::path::PathBuf;
    use std::time::Duration;

    use afkpool_protocol::{ClientEvent, Identity};
    use afkpool_transport::{
        ConnectRequest, Connector, GameClient, GatewayConfig, GatewayConnector, ProxyEndpoint,
        TransportError,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = WebSocketStream<TcpStream>;

    /// Binds a gateway listener and returns it with its `ws://` URL.
    async fn bind_gateway() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept_ws(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_json(ws: &mut ServerWs) -> serde_json::Value {
        loop {
            match ws.next().await.expect("frame").expect("ok frame") {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
                _ => continue,
            }
        }
    }

    fn connector(url: String) -> GatewayConnector {
        GatewayConnector::new(GatewayConfig {
            url,
            server_host: "donutsmp.net".into(),
            server_port: 19132,
        })
    }

    fn request(proxy: Option<ProxyEndpoint>) -> (ConnectRequest, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let req = ConnectRequest {
            identity: Identity::parse("a@example.com").unwrap(),
            profile_dir: PathBuf::from("auth/a@example.com"),
            proxy,
            events,
        };
        (req, rx)
    }

    async fn recv_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within 5s")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_connect_sends_hello_and_forwards_events() {
        let (listener, url) = bind_gateway().await;
        let server = tokio::spawn(async move {
            let mut ws = accept_ws(&listener).await;
            let hello = next_json(&mut ws).await;
            ws.send(Message::Text(
                r#"{"event":"spawned","username":"playerOne"}"#.into(),
            ))
            .await
            .unwrap();
            let chat = next_json(&mut ws).await;
            (hello, chat, ws)
        });

        let (req, mut events) = request(None);
        let client = connector(url).connect(req).await.expect("connect");

        assert_eq!(
            recv_event(&mut events).await,
            ClientEvent::Spawned {
                username: "playerOne".into()
            }
        );

        client
            .send_text(afkpool_protocol::TextPacket::chat(".playerOne", "hello"))
            .unwrap();

        let (hello, chat, _ws) = server.await.unwrap();
        assert_eq!(hello["op"], "connect");
        assert_eq!(hello["identity"], "a@example.com");
        assert_eq!(hello["host"], "donutsmp.net");
        assert_eq!(hello["profiles_folder"], "auth/a@example.com");
        assert_eq!(chat["op"], "text");
        assert_eq!(chat["message"], "hello");
        assert_eq!(chat["source_name"], ".playerOne");
    }

    #[tokio::test]
    async fn test_gateway_close_is_reported_as_closed_event() {
        let (listener, url) = bind_gateway().await;
        tokio::spawn(async move {
            let mut ws = accept_ws(&listener).await;
            let _ = next_json(&mut ws).await;
            ws.close(None).await.unwrap();
        });

        let (req, mut events) = request(None);
        let _client = connector(url).connect(req).await.expect("connect");

        assert!(matches!(
            recv_event(&mut events).await,
            ClientEvent::Closed { .. }
        ));
    }

    #[tokio::test]
    async fn test_undecodable_frames_are_skipped() {
        let (listener, url) = bind_gateway().await;
        tokio::spawn(async move {
            let mut ws = accept_ws(&listener).await;
            let _ = next_json(&mut ws).await;
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"error","reason":"kicked"}"#.into()))
                .await
                .unwrap();
            // Keep the socket open until the client is done.
            let _ = ws.next().await;
        });

        let (req, mut events) = request(None);
        let _client = connector(url).connect(req).await.expect("connect");

        assert_eq!(
            recv_event(&mut events).await,
            ClientEvent::Error {
                reason: "kicked".into()
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_closes_socket() {
        let (listener, url) = bind_gateway().await;
        let server = tokio::spawn(async move {
            let mut ws = accept_ws(&listener).await;
            let _ = next_json(&mut ws).await;
            let bye = next_json(&mut ws).await;
            // After the disconnect request the client closes the socket.
            let rest = ws.next().await;
            (bye, rest)
        });

        let (req, _events) = request(None);
        let client = connector(url).connect(req).await.expect("connect");
        client.disconnect();

        let (bye, rest) = server.await.unwrap();
        assert_eq!(bye["op"], "disconnect");
        assert!(matches!(rest, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }

    #[tokio::test]
    async fn test_connect_through_http_connect_proxy() {
        let (gateway, url) = bind_gateway().await;
        let gateway_addr = gateway.local_addr().unwrap();

        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_url = format!("http://user:p%40ss@{}", proxy.local_addr().unwrap());

        // Minimal CONNECT proxy: record the request head, answer 200, pipe bytes.
        let proxy_task = tokio::spawn(async move {
            let (client, _) = proxy.accept().await.unwrap();
            let mut reader = BufReader::new(client);
            let mut head = Vec::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                if line == "\r\n" {
                    break;
                }
                head.push(line.trim_end().to_string());
            }
            let mut client = reader.into_inner();
            client
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
            let mut upstream = TcpStream::connect(gateway_addr).await.unwrap();
            tokio::spawn(async move {
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
            head
        });

        let gateway_task = tokio::spawn(async move {
            let mut ws = accept_ws(&gateway).await;
            next_json(&mut ws).await
        });

        let (req, _events) = request(Some(ProxyEndpoint::new(proxy_url, None)));
        let _client = connector(url).connect(req).await.expect("connect via proxy");

        let head = proxy_task.await.unwrap();
        assert_eq!(head[0], format!("CONNECT {gateway_addr} HTTP/1.1"));
        // base64("user:p@ss"): credentials are percent-decoded first
        assert!(head.iter().any(|h| h == "Proxy-Authorization: Basic dXNlcjpwQHNz"));

        let hello = gateway_task.await.unwrap();
        assert_eq!(hello["op"], "connect");
    }

    #[tokio::test]
    async fn test_proxy_refusal_is_construction_error() {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_url = format!("http://{}", proxy.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut client, _) = proxy.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = tokio::io::AsyncReadExt::read(&mut client, &mut buf).await;
            let _ = client
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await;
        });

        let (req, _events) = request(Some(ProxyEndpoint::new(proxy_url, None)));
        let result = connector("ws://127.0.0.1:1".into()).connect(req).await;

        assert!(matches!(result, Err(TransportError::ProxyRejected(_))));
    }

    #[tokio::test]
    async fn test_endless_proxy_status_line_is_rejected() {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_url = format!("http://{}", proxy.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut client, _) = proxy.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = tokio::io::AsyncReadExt::read(&mut client, &mut buf).await;
            // A status line that never ends.
            let chunk = [b'a'; 4096];
            while client.write_all(&chunk).await.is_ok() {}
        });

        let (req, _events) = request(Some(ProxyEndpoint::new(proxy_url, None)));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            connector("ws://127.0.0.1:1".into()).connect(req),
        )
        .await
        .expect("bounded read gives up");

        match result {
            Err(TransportError::ProxyRejected(msg)) => assert!(msg.contains("too large"), "{msg}"),
            other => panic!("expected ProxyRejected, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_wss_gateway_starts_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("wss://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            tokio::io::AsyncReadExt::read_exact(&mut stream, &mut first)
                .await
                .unwrap();
            first[0]
        });

        let (req, _events) = request(None);
        let result = connector(url).connect(req).await;

        // 0x16 opens a TLS handshake record (the ClientHello).
        assert_eq!(server.await.unwrap(), 0x16);
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_malformed_proxy_url_is_construction_error() {
        let (req, _events) = request(Some(ProxyEndpoint::new("socks5://nope:1080", None)));
        let result = connector("ws://127.0.0.1:1".into()).connect(req).await;

        assert!(matches!(result, Err(TransportError::InvalidProxy(_))));
    }
}
