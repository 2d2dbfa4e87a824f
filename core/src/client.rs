//! Blocking mTLS POST client that reports the server's leaf certificate.
//!
//! # Design
//! `SecureClient` holds its [`SendOptions`] and an optional resolver and
//! carries no state between calls. One call is one attempt:
//!
//! 1. validate the URL, load the credentials, build the rustls config and the
//!    request, all before any socket is opened;
//! 2. resolve, TCP-connect and complete the TLS handshake within
//!    `connect_timeout`;
//! 3. record the server's leaf certificate;
//! 4. exchange the request and response over a hyper HTTP/1.1 connection
//!    within `overall_timeout` measured from the start.
//!
//! The I/O runs on a current-thread tokio runtime owned by the call, so the
//! public API stays synchronous. It must not be called from inside another
//! tokio runtime.
//!
//! Under TLS 1.3 a server that rejects our certificate says so with an alert
//! sent after our side of the handshake has finished. When the exchange then
//! fails because the connection went away, any records still queued on the
//! socket are read once more so that alert is reported as a TLS failure.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::Instrument;

use crate::certificate::PeerCertificate;
use crate::credentials::ClientIdentity;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::options::SendOptions;
use crate::resolve::{Resolve, SystemResolver};
use crate::tls::build_client_config;

/// How long to wait for queued TLS records after the connection was lost.
const ALERT_GRACE: Duration = Duration::from_millis(250);

/// Outcome of a successful call: the HTTP response plus the certificate the
/// server presented.
#[derive(Debug, Clone)]
pub struct AuthenticatedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub peer_certificate: PeerCertificate,
}

/// Synchronous client for authenticated POSTs.
#[derive(Clone, Default)]
pub struct SecureClient {
    options: SendOptions,
    resolver: Option<Arc<dyn Resolve>>,
}

impl fmt::Debug for SecureClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureClient")
            .field("options", &self.options)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl SecureClient {
    pub fn new(options: SendOptions) -> Self {
        Self {
            options,
            resolver: None,
        }
    }

    /// Resolve host names with `resolver` instead of the system resolver.
    /// Resolution counts against `connect_timeout`.
    pub fn dns_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// POST `body` to `url`, presenting the PEM certificate and key.
    ///
    /// Credential problems are reported before any network I/O.
    pub fn send_authenticated(
        &self,
        url: &str,
        body: &[u8],
        client_cert_pem: &[u8],
        client_key_pem: &[u8],
    ) -> Result<AuthenticatedResponse> {
        let request = self.request(url, body)?;
        let identity = ClientIdentity::from_pem(client_cert_pem, client_key_pem)?;
        self.execute(&request, &identity)
    }

    /// Like [`SecureClient::send_authenticated`] with already loaded
    /// credentials.
    pub fn send_with_identity(
        &self,
        url: &str,
        body: &[u8],
        identity: &ClientIdentity,
    ) -> Result<AuthenticatedResponse> {
        let request = self.request(url, body)?;
        self.execute(&request, identity)
    }

    fn request(&self, url: &str, body: &[u8]) -> Result<HttpRequest> {
        self.options.validate()?;
        Ok(HttpRequest::post(url, body)?.with_headers(&self.options.headers))
    }

    fn execute(
        &self,
        request: &HttpRequest,
        identity: &ClientIdentity,
    ) -> Result<AuthenticatedResponse> {
        let config = Arc::new(build_client_config(identity, &self.options)?);
        let server_name = server_name(request.host())?;
        let message = request.to_hyper()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Network(format!("cannot start I/O runtime: {e}")))?;
        let span = tracing::debug_span!("send_authenticated", url = %request.url);
        let result = runtime.block_on(
            self.exchange(request, message, config, server_name)
                .instrument(span),
        );
        // A lookup abandoned at the deadline may still occupy a blocking
        // thread; do not wait for it.
        runtime.shutdown_background();
        result
    }

    async fn exchange(
        &self,
        request: &HttpRequest,
        message: hyper::Request<Full<Bytes>>,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<AuthenticatedResponse> {
        let started = Instant::now();
        let overall = Deadline::new(started, self.options.overall_timeout, Phase::Exchange);
        let connect = if self.options.connect_timeout < self.options.overall_timeout {
            Deadline::new(started, self.options.connect_timeout, Phase::Connect)
        } else {
            overall
        };

        let mut tls = connect
            .within(self.connect(request, config, server_name))
            .await?;
        let peer_certificate = {
            let (_, conn) = tls.get_ref();
            tracing::debug!(
                elapsed = ?started.elapsed(),
                version = ?conn.protocol_version(),
                "handshake complete"
            );
            conn.peer_certificates()
                .and_then(|chain| chain.first())
                .map(|leaf| PeerCertificate::from_der(leaf.as_ref()))
                .ok_or_else(|| {
                    Error::TlsHandshake("server presented no certificate".to_string())
                })?
        };

        let outcome = timeout_at(overall.at, send(&mut tls, message)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(exchange_error(e, &mut tls, overall).await),
            Err(_) => return Err(overall.expired()),
        };
        tracing::debug!(
            status = response.status,
            bytes = response.body.len(),
            elapsed = ?started.elapsed(),
            "response received"
        );

        Ok(AuthenticatedResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            peer_certificate,
        })
    }

    async fn connect(
        &self,
        request: &HttpRequest,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<TlsStream<TcpStream>> {
        let (host, port) = (request.host(), request.port());
        let resolving = match &self.resolver {
            Some(resolver) => resolver.resolve(host),
            None => SystemResolver.resolve(host),
        };
        let addrs: Vec<SocketAddr> = resolving
            .await
            .map_err(|e| Error::Network(format!("cannot resolve {host}: {e}")))?
            .map(|mut addr| {
                addr.set_port(port);
                addr
            })
            .collect();
        if addrs.is_empty() {
            return Err(Error::Network(format!("{host} resolved to no addresses")));
        }

        let tcp = connect_tcp(host, port, &addrs).await?;
        TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(handshake_error)
    }
}

/// One-shot form of [`SecureClient::send_authenticated`].
pub fn send_authenticated(
    url: &str,
    body: &[u8],
    client_cert_pem: &[u8],
    client_key_pem: &[u8],
    options: SendOptions,
) -> Result<AuthenticatedResponse> {
    SecureClient::new(options).send_authenticated(url, body, client_cert_pem, client_key_pem)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Exchange,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
    phase: Phase,
}

impl Deadline {
    fn new(start: Instant, budget: Duration, phase: Phase) -> Self {
        Self {
            at: start + budget,
            budget,
            phase,
        }
    }

    fn expired(&self) -> Error {
        match self.phase {
            Phase::Connect => Error::ConnectTimeout(self.budget),
            Phase::Exchange => Error::RequestTimeout(self.budget),
        }
    }

    async fn within<T>(&self, step: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match timeout_at(self.at, step).await {
            Ok(result) => result,
            Err(_) => Err(self.expired()),
        }
    }
}

fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::InvalidRequest(format!("invalid server name {host:?}: {e}")))
}

async fn connect_tcp(host: &str, port: u16, addrs: &[SocketAddr]) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(sock) => {
                tracing::debug!(%addr, "tcp connected");
                let _ = sock.set_nodelay(true);
                return Ok(sock);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "tcp connect failed");
                last_error = Some(e);
            }
        }
    }
    Err(Error::Network(format!(
        "cannot connect to {host}:{port}: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Run one request over a fresh HTTP/1.1 connection and collect the body.
async fn send(
    tls: &mut TlsStream<TcpStream>,
    message: hyper::Request<Full<Bytes>>,
) -> std::result::Result<HttpResponse, hyper::Error> {
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
    let exchange = async move {
        sender.ready().await?;
        let response = sender.send_request(message).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok::<_, hyper::Error>(HttpResponse::from_parts(parts.status, &parts.headers, body))
    };
    match tokio::join!(exchange, conn) {
        (Err(e), Err(conn_error)) if e.is_canceled() => Err(conn_error),
        (response, _) => response,
    }
}

fn handshake_error(e: io::Error) -> Error {
    if let Some(tls_error) = find_tls_error(&e) {
        return Error::TlsHandshake(tls_error.to_string());
    }
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => {
            Error::TlsHandshake(format!("server closed the connection: {e}"))
        }
        _ => Error::Network(e.to_string()),
    }
}

async fn exchange_error(
    e: hyper::Error,
    tls: &mut TlsStream<TcpStream>,
    deadline: Deadline,
) -> Error {
    if let Some(tls_error) = find_tls_error(&e) {
        return Error::TlsHandshake(tls_error.to_string());
    }
    if connection_lost(&e) {
        if let Some(alert) = pending_tls_error(tls, deadline).await {
            tracing::debug!(error = %alert, "TLS alert read after the connection was lost");
            return Error::TlsHandshake(alert);
        }
    }
    Error::Network(e.to_string())
}

/// Read whatever records are still queued on the socket and report a TLS
/// failure among them, typically the peer's alert.
async fn pending_tls_error(tls: &mut TlsStream<TcpStream>, deadline: Deadline) -> Option<String> {
    let until = (Instant::now() + ALERT_GRACE).min(deadline.at);
    let mut scratch = [0u8; 512];
    match timeout_at(until, tls.read(&mut scratch)).await {
        Ok(Err(e)) => find_tls_error(&e).map(|tls_error| tls_error.to_string()),
        _ => None,
    }
}

fn connection_lost(e: &hyper::Error) -> bool {
    if e.is_incomplete_message() || e.is_canceled() || e.is_closed() {
        return true;
    }
    io_kind(e).is_some_and(|kind| {
        matches!(
            kind,
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof
        )
    })
}

fn io_kind(e: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(e);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        current = err.source();
    }
    None
}

/// Find a rustls error anywhere in the chain, including inside the
/// `io::Error` that tokio-rustls wraps it in.
fn find_tls_error<'a>(e: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(e);
    while let Some(err) = current {
        if let Some(tls_error) = err.downcast_ref::<rustls::Error>() {
            return Some(tls_error);
        }
        if let Some(tls_error) = err
            .downcast_ref::<io::Error>()
            .and_then(|io_error| io_error.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(tls_error);
        }
        current = err.source();
    }
    None
}
