// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP relay to the telemetry backend
//!
//! The gateway forwards each received envelope as the query string of a
//! single `GET` request. The query is the envelope's wire text, unchanged:
//!
//! ```text
//! GET /.netlify/functions/server?deviceID=X1&current=1.0&voltage=230.0 HTTP/1.1
//! Host: electrometer.netlify.app
//! Connection: close
//! ```
//!
//! The wire codec only reserves `=` and `&`, so text arriving over the air
//! may still hold spaces or line breaks. Those would split the request line,
//! and a request carrying them is refused rather than escaped.
//!
//! Delivery is fire-and-forget: the request is written and the connection
//! closed, no acknowledgement is awaited.

use crate::envelope::TelemetryEnvelope;
use crate::error::{CodecError, Result, TransportError};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Backend path receiving telemetry
pub const RELAY_PATH: &str = "/.netlify/functions/server";

/// Default backend host
pub const DEFAULT_RELAY_HOST: &str = "electrometer.netlify.app";

/// One relay request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// Backend host name, sent as the `Host` header
    pub host: String,
    /// Request path
    pub path: String,
    /// Query string without the leading `?`
    pub query: String,
}

impl RelayRequest {
    /// Build a request carrying `envelope` as its query string
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsafeForRelay`] if the host, path or envelope
    /// text holds a space or a control character.
    pub fn from_envelope(
        host: impl Into<String>,
        path: impl Into<String>,
        envelope: &TelemetryEnvelope,
    ) -> Result<Self> {
        let request = Self {
            host: host.into(),
            path: path.into(),
            query: envelope.serialize(),
        };
        check_relay_safe(&request.host)?;
        check_relay_safe(&request.path)?;
        check_relay_safe(&request.query)?;
        Ok(request)
    }

    /// Request target: path plus query
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Render the full HTTP/1.1 request
    pub fn to_http(&self) -> String {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.target(),
            self.host
        )
    }
}

/// Reject text that would break the `GET <target> HTTP/1.1` line
pub fn check_relay_safe(text: &str) -> Result<()> {
    match text
        .char_indices()
        .find(|(_, c)| *c == ' ' || c.is_control())
    {
        Some((offset, found)) => Err(CodecError::UnsafeForRelay { offset, found }.into()),
        None => Ok(()),
    }
}

/// Client able to issue a relay request
pub trait HttpClient {
    /// Send `request`; returns the number of bytes written
    fn get(&mut self, request: &RelayRequest) -> Result<usize>;
}

impl<H: HttpClient + ?Sized> HttpClient for Box<H> {
    fn get(&mut self, request: &RelayRequest) -> Result<usize> {
        (**self).get(request)
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port).to_socket_addrs().map_err(TransportError::from)?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_write_timeout(Some(timeout))
                    .map_err(TransportError::from)?;
                stream
                    .set_read_timeout(Some(timeout))
                    .map_err(TransportError::from)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => TransportError::from(e).into(),
        None => TransportError::Unavailable {
            reason: format!("no address for {host}:{port}"),
        }
        .into(),
    })
}

/// Plain-TCP HTTP client
#[derive(Debug, Clone)]
pub struct TcpHttpClient {
    port: u16,
    timeout: Duration,
}

impl TcpHttpClient {
    /// Create a client connecting to `port` on the request host
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set connect, read and write timeouts
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TcpHttpClient {
    fn default() -> Self {
        Self::new(80)
    }
}

impl HttpClient for TcpHttpClient {
    fn get(&mut self, request: &RelayRequest) -> Result<usize> {
        let mut stream = connect(&request.host, self.port, self.timeout)?;
        let http = request.to_http();
        log::debug!("GET {} (host {})", request.target(), request.host);

        stream
            .write_all(http.as_bytes())
            .map_err(TransportError::from)?;
        stream.flush().map_err(TransportError::from)?;

        let mut status = String::new();
        match BufReader::new(&mut stream).read_line(&mut status) {
            Ok(_) => log::debug!("relay response: {}", status.trim_end()),
            Err(e) => log::debug!("no relay response: {}", e),
        }
        Ok(http.len())
    }
}

/// HTTPS client (rustls with the webpki root store)
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsHttpClient {
    config: std::sync::Arc<rustls::ClientConfig>,
    port: u16,
    timeout: Duration,
}

#[cfg(feature = "tls")]
impl TlsHttpClient {
    /// Create a client connecting to port 443
    pub fn new() -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            config: std::sync::Arc::new(config),
            port: 443,
            timeout: Duration::from_secs(10),
        }
    }

    /// Connect to `port` instead of 443
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect, read and write timeouts
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(feature = "tls")]
impl Default for TlsHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tls")]
impl HttpClient for TlsHttpClient {
    fn get(&mut self, request: &RelayRequest) -> Result<usize> {
        let server_name = rustls::ServerName::try_from(request.host.as_str()).map_err(|e| {
            TransportError::Unavailable {
                reason: format!("invalid server name {}: {}", request.host, e),
            }
        })?;
        let conn = rustls::ClientConnection::new(self.config.clone(), server_name).map_err(|e| {
            TransportError::Unavailable {
                reason: format!("TLS setup failed: {e}"),
            }
        })?;
        let sock = connect(&request.host, self.port, self.timeout)?;
        let mut stream = rustls::StreamOwned::new(conn, sock);

        let http = request.to_http();
        log::debug!("GET https://{}{}", request.host, request.target());
        stream
            .write_all(http.as_bytes())
            .map_err(TransportError::from)?;
        stream.flush().map_err(TransportError::from)?;
        Ok(http.len())
    }
}

/// Records requests instead of sending them
#[derive(Debug, Default)]
pub struct MemoryHttpClient {
    requests: Vec<RelayRequest>,
    available: bool,
}

impl MemoryHttpClient {
    /// Create a client that accepts every request
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            available: true,
        }
    }

    /// Make subsequent requests fail (or succeed again)
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Requests accepted so far
    pub fn requests(&self) -> &[RelayRequest] {
        &self.requests
    }

    /// Most recent accepted request
    pub fn last(&self) -> Option<&RelayRequest> {
        self.requests.last()
    }
}

impl HttpClient for MemoryHttpClient {
    fn get(&mut self, request: &RelayRequest) -> Result<usize> {
        if !self.available {
            return Err(TransportError::Unavailable {
                reason: "backend unreachable".to_string(),
            }
            .into());
        }
        self.requests.push(request.clone());
        Ok(request.to_http().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Read;
    use std::net::TcpListener;

    fn envelope() -> TelemetryEnvelope {
        TelemetryEnvelope::from_pairs([("deviceID", "X1"), ("current", "1.0"), ("voltage", "230.0")])
            .unwrap()
    }

    #[test]
    fn test_request_target() {
        let request =
            RelayRequest::from_envelope(DEFAULT_RELAY_HOST, RELAY_PATH, &envelope()).unwrap();
        assert_eq!(
            request.target(),
            "/.netlify/functions/server?deviceID=X1&current=1.0&voltage=230.0"
        );
    }

    #[test]
    fn test_request_http_rendering() {
        let request = RelayRequest::from_envelope("example.org", "/ingest", &envelope()).unwrap();
        assert_eq!(
            request.to_http(),
            "GET /ingest?deviceID=X1&current=1.0&voltage=230.0 HTTP/1.1\r\n\
             Host: example.org\r\n\
             Connection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_request_without_query() {
        let request =
            RelayRequest::from_envelope("h", RELAY_PATH, &TelemetryEnvelope::new()).unwrap();
        assert_eq!(request.target(), RELAY_PATH);
    }

    #[test]
    fn test_line_breaks_are_refused() {
        let envelope = TelemetryEnvelope::from_pairs([
            ("deviceID", "X1\r\nX-Injected: yes\r\n\r\nGET /admin HTTP/1.1"),
            ("current", "1.0"),
        ])
        .unwrap();
        let err = RelayRequest::from_envelope("h", RELAY_PATH, &envelope).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
        assert_eq!(
            err,
            crate::error::TelemetryError::from(CodecError::UnsafeForRelay {
                offset: 11,
                found: '\r'
            })
        );
    }

    #[test]
    fn test_spaces_are_refused() {
        let envelope = TelemetryEnvelope::from_pairs([("deviceID", "my node")]).unwrap();
        let err = RelayRequest::from_envelope("h", RELAY_PATH, &envelope).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);

        let err = RelayRequest::from_envelope("bad host", RELAY_PATH, &self::envelope()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
    }

    #[test]
    fn test_request_line_has_three_parts() {
        let request = RelayRequest::from_envelope("h", RELAY_PATH, &envelope()).unwrap();
        let http = request.to_http();
        let line = http.split("\r\n").next().unwrap();
        assert_eq!(line.split(' ').count(), 3);
        assert_eq!(http.matches("\r\n").count(), 4);
    }

    #[test]
    fn test_memory_client() {
        let mut client = MemoryHttpClient::new();
        let request = RelayRequest::from_envelope("h", RELAY_PATH, &envelope()).unwrap();
        let written = client.get(&request).unwrap();
        assert_eq!(written, request.to_http().len());
        assert_eq!(client.last(), Some(&request));

        client.set_available(false);
        let err = client.get(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
        assert_eq!(client.requests().len(), 1);
    }

    #[test]
    fn test_tcp_client_writes_request() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 256];
            while !buf.ends_with(b"\r\n\r\n") {
                let n = socket.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
            String::from_utf8(buf).unwrap()
        });

        let mut client = TcpHttpClient::new(port).with_timeout(Duration::from_secs(5));
        let request =
            RelayRequest::from_envelope("127.0.0.1", RELAY_PATH, &envelope()).unwrap();
        let written = client.get(&request).unwrap();

        let received = server.join().unwrap();
        assert_eq!(received, request.to_http());
        assert_eq!(written, received.len());
    }

    #[test]
    fn test_tcp_client_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut client = TcpHttpClient::new(port).with_timeout(Duration::from_millis(500));
        let request =
            RelayRequest::from_envelope("127.0.0.1", RELAY_PATH, &envelope()).unwrap();
        let err = client.get(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    }
}
