//! Egress proxy endpoints.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::TransportError;

/// One egress proxy, as configured.
///
/// The URL is kept verbatim and only parsed when a connection is made,
/// so a malformed entry fails that connection (and gets retried) rather
/// than the whole process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    url: String,
    label: String,
}

/// The parsed pieces of an `http://[user:pass@]host[:port]` proxy URL.
///
/// `host` is bare (no IPv6 brackets) and the credentials are
/// percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddr {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl ProxyEndpoint {
    /// Creates an endpoint. Without an explicit label the `host:port`
    /// part of the URL is used (credentials are never part of a label).
    pub fn new(url: impl Into<String>, label: Option<String>) -> Self {
        let url = url.into();
        let label = label.unwrap_or_else(|| default_label(&url));
        Self { url, label }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Human-readable name shown in status snapshots.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parses the URL.
    ///
    /// Only `http://` proxies are supported (tunnelled with `CONNECT`).
    /// The port defaults to 80.
    ///
    /// # Errors
    /// [`TransportError::InvalidProxy`] for any other scheme, a missing
    /// host, a bad port, or credentials that do not decode to UTF-8.
    pub fn addr(&self) -> Result<ProxyAddr, TransportError> {
        let url = Url::parse(&self.url).map_err(|e| self.invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(self.invalid("only http:// proxies are supported"));
        }
        let host = bare_host(&url).ok_or_else(|| self.invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| self.invalid("bad port"))?;

        let credentials = if url.username().is_empty() && url.password().is_none() {
            None
        } else {
            let user = self.decode(url.username())?;
            let pass = self.decode(url.password().unwrap_or_default())?;
            Some((user, pass))
        };

        Ok(ProxyAddr {
            host,
            port,
            credentials,
        })
    }

    fn decode(&self, raw: &str) -> Result<String, TransportError> {
        percent_decode_str(raw)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| self.invalid("credentials are not valid UTF-8"))
    }

    fn invalid(&self, why: &str) -> TransportError {
        TransportError::InvalidProxy(format!("{}: {why}", self.label))
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// The URL's host without IPv6 brackets, ready for `TcpStream::connect`.
pub(crate) fn bare_host(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) if !domain.is_empty() => Some(domain.to_string()),
        Host::Domain(_) => None,
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

/// `host[:port]` of the URL, or the URL itself when it does not parse.
fn default_label(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) if !host.is_empty() => format!("{host}:{port}"),
        (Some(host), None) if !host.is_empty() => host.to_string(),
        _ => raw.to_string(),
    }
}
