//! HTTP `CONNECT` tunnelling through an egress proxy.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Take};
use tokio::net::TcpStream;

use crate::{ProxyEndpoint, TransportError};

/// Upper bound on the proxy's response head, to stop a misbehaving proxy
/// from feeding us headers forever.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// Opens a TCP stream to `target_host:target_port` through `proxy`.
///
/// On return the stream is a raw byte pipe to the target; the caller
/// layers WebSocket (or anything else) on top.
pub(crate) async fn connect_via(
    proxy: &ProxyEndpoint,
    target_host: &str,
    target_port: u16,
) -> Result<TcpStream, TransportError> {
    let addr = proxy.addr()?;
    let stream = TcpStream::connect((addr.host.as_str(), addr.port))
        .await
        .map_err(TransportError::ConnectFailed)?;

    let target = if target_host.contains(':') {
        format!("[{target_host}]:{target_port}")
    } else {
        format!("{target_host}:{target_port}")
    };
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some((user, pass)) = &addr.credentials {
        let token = STANDARD.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");

    let mut reader = BufReader::new(stream);
    reader
        .get_mut()
        .write_all(request.as_bytes())
        .await
        .map_err(TransportError::ConnectFailed)?;

    // Every line of the head, status line included, is read through one
    // byte budget.
    let mut head = (&mut reader).take(MAX_RESPONSE_HEAD as u64);

    let mut status_line = String::new();
    read_head_line(&mut head, &mut status_line, proxy).await?;
    let status_ok = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code.starts_with('2'));
    if !status_ok {
        return Err(TransportError::ProxyRejected(format!(
            "{proxy}: {}",
            status_line.trim_end()
        )));
    }

    // Drain the remaining header lines up to the blank line.
    loop {
        let mut line = String::new();
        read_head_line(&mut head, &mut line, proxy).await?;
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    tracing::debug!(%proxy, %target, "proxy tunnel established");

    // The target has not been sent anything yet, so nothing past the
    // response head can be sitting in the read buffer.
    Ok(reader.into_inner())
}

/// Reads one newline-terminated line of the response head into `line`.
async fn read_head_line<R: AsyncBufRead + Unpin>(
    head: &mut Take<R>,
    line: &mut String,
    proxy: &ProxyEndpoint,
) -> Result<(), TransportError> {
    head.read_line(line)
        .await
        .map_err(TransportError::ConnectFailed)?;
    if line.ends_with('\n') {
        return Ok(());
    }
    if head.limit() == 0 {
        return Err(TransportError::ProxyRejected(format!(
            "{proxy}: response head too large"
        )));
    }
    Err(TransportError::ProxyRejected(format!(
        "{proxy}: closed during CONNECT"
    )))
}
