use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::{net::TcpListener, sync::RwLock};
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

pub mod error;
pub mod pki;
pub mod tls;

pub use error::ServerError;

/// How long `/slow` waits before answering.
pub const SLOW_RESPONSE_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub bodyhtml: String,
}

#[derive(Deserialize)]
pub struct SendMailRequest {
    pub sendmail: SendMail,
}

#[derive(Deserialize)]
pub struct SendMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub bodyhtml: String,
}

pub type Mailbox = Arc<RwLock<Vec<Mail>>>;

/// Connection-level counters shared between the accept loop and tests.
#[derive(Clone, Default, Debug)]
pub struct Stats {
    connections: Arc<AtomicUsize>,
    client_certs: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl Stats {
    /// TCP connections accepted, whether or not the handshake succeeded.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// DER leaf certificates of clients that completed the handshake.
    pub async fn client_certs(&self) -> Vec<Vec<u8>> {
        self.client_certs.read().await.clone()
    }

    pub fn blocking_client_certs(&self) -> Vec<Vec<u8>> {
        self.client_certs.blocking_read().clone()
    }
}

pub fn app() -> Router {
    app_with_mailbox(Mailbox::default())
}

pub fn app_with_mailbox(mailbox: Mailbox) -> Router {
    Router::new()
        .route("/sendmail", post(send_mail))
        .route("/echo", post(echo))
        .route("/slow", post(slow))
        .fallback(fallback)
        .with_state(mailbox)
}

/// Accept TLS connections on `listener` and serve [`app`] on each one.
pub async fn run(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    stats: Stats,
) -> Result<(), std::io::Error> {
    serve(listener, tls, stats, Mailbox::default()).await
}

pub async fn serve(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    stats: Stats,
    mailbox: Mailbox,
) -> Result<(), std::io::Error> {
    let acceptor = TlsAcceptor::from(tls);
    let app = app_with_mailbox(mailbox);
    loop {
        let (tcp, peer) = listener.accept().await?;
        stats.connections.fetch_add(1, Ordering::SeqCst);
        let acceptor = acceptor.clone();
        let app = app.clone();
        let stats = stats.clone();

        tokio::spawn(async move {
            let stream = match acceptor.accept(tcp).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };
            if let Some(leaf) = stream.get_ref().1.peer_certificates().and_then(|c| c.first()) {
                stats.client_certs.write().await.push(leaf.to_vec());
            }
            tracing::debug!(%peer, "client authenticated");

            let service = TowerToHyperService::new(app);
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// Accept TLS connections on `listener` and answer every request with the
/// exact bytes in `response`, then close with `close_notify`.
///
/// The request head and any `Content-Length` body are read first so the
/// client never sees a reset while it is still writing.
pub async fn serve_raw(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    stats: Stats,
    response: Arc<[u8]>,
) -> Result<(), io::Error> {
    let acceptor = TlsAcceptor::from(tls);
    loop {
        let (tcp, peer) = listener.accept().await?;
        stats.connections.fetch_add(1, Ordering::SeqCst);
        let acceptor = acceptor.clone();
        let response = response.clone();

        tokio::spawn(async move {
            let mut stream = match acceptor.accept(tcp).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let answered = async {
                read_request(&mut stream).await?;
                stream.write_all(&response).await?;
                stream.shutdown().await
            };
            if let Err(e) = answered.await {
                tracing::debug!(%peer, error = %e, "raw exchange failed");
            }
        });
    }
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(), io::Error> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head_end = head_end + 4;
            if buf.len() >= head_end + content_length(&buf[..head_end]) {
                return Ok(());
            }
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..read]);
    }
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Handle to a server running on its own thread and runtime.
pub struct BackgroundServer {
    pub addr: SocketAddr,
    pub stats: Stats,
    pub mailbox: Mailbox,
}

impl BackgroundServer {
    /// Bind `127.0.0.1:0` and serve on a dedicated thread until the process
    /// exits.
    pub fn start(tls: Arc<rustls::ServerConfig>) -> Result<Self, io::Error> {
        Self::spawn(move |listener, stats, mailbox| serve(listener, tls, stats, mailbox))
    }

    /// Like [`BackgroundServer::start`], answering every request with the
    /// raw bytes of `response`.
    pub fn start_raw(
        tls: Arc<rustls::ServerConfig>,
        response: impl Into<Vec<u8>>,
    ) -> Result<Self, io::Error> {
        let response: Arc<[u8]> = Arc::from(response.into());
        Self::spawn(move |listener, stats, _| serve_raw(listener, tls, stats, response))
    }

    fn spawn<F, Fut>(serve_with: F) -> Result<Self, io::Error>
    where
        F: FnOnce(TcpListener, Stats, Mailbox) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), io::Error>>,
    {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = std_listener.local_addr()?;
        std_listener.set_nonblocking(true)?;

        let stats = Stats::default();
        let mailbox = Mailbox::default();
        let (thread_stats, thread_mailbox) = (stats.clone(), mailbox.clone());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        std::thread::spawn(move || {
            let result = runtime.block_on(async {
                let listener = TcpListener::from_std(std_listener)?;
                serve_with(listener, thread_stats, thread_mailbox).await
            });
            if let Err(e) = result {
                tracing::error!(error = %e, "mock server stopped");
            }
        });

        Ok(Self {
            addr,
            stats,
            mailbox,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("https://{}{path}", self.addr)
    }
}

async fn send_mail(State(mailbox): State<Mailbox>, body: Bytes) -> Json<Value> {
    let request: SendMailRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "incomplete or invalid sendmail request");
            return Json(json!({ "status": "Failed" }));
        }
    };
    let SendMail {
        from,
        to,
        subject,
        bodyhtml,
    } = request.sendmail;
    mailbox.write().await.push(Mail {
        id: Uuid::new_v4(),
        from,
        to,
        subject,
        bodyhtml,
    });
    Json(json!({ "status": "Received" }))
}

async fn echo(body: Bytes) -> Bytes {
    body
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
    "too late"
}

async fn fallback() -> &'static str {
    "It's work"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mail_serializes_to_json() {
        let mail = Mail {
            id: Uuid::nil(),
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: "Hi".to_string(),
            bodyhtml: "<h1>Hi</h1>".to_string(),
        };
        let json = serde_json::to_value(&mail).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["subject"], "Hi");
    }

    #[test]
    fn sendmail_request_requires_all_fields() {
        let result: Result<SendMailRequest, _> =
            serde_json::from_str(r#"{"sendmail":{"from":"a","to":"b","subject":"c"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn sendmail_request_parses() {
        let request: SendMailRequest = serde_json::from_str(
            r#"{"sendmail":{"from":"a","to":"b","subject":"c","bodyhtml":"d"}}"#,
        )
        .unwrap();
        assert_eq!(request.sendmail.bodyhtml, "d");
    }

    #[test]
    fn content_length_is_read_from_head() {
        let head = b"POST / HTTP/1.1\r\nhost: x\r\ncontent-length: 12\r\n\r\n";
        assert_eq!(content_length(head), 12);
        assert_eq!(content_length(b"POST / HTTP/1.1\r\n\r\n"), 0);
    }

    #[tokio::test]
    async fn request_is_read_through_its_body() {
        let request = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc".to_vec();
        let mut reader = &request[..];
        read_request(&mut reader).await.unwrap();

        let mut truncated = &request[..request.len() - 1];
        let err = read_request(&mut truncated).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn stats_start_at_zero() {
        let stats = Stats::default();
        assert_eq!(stats.connections(), 0);
        assert!(stats.blocking_client_certs().is_empty());
    }
}
