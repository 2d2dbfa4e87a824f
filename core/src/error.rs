//! Error types for the authenticated POST client.
//!
//! # Design
//! Every failure of a single call lands in exactly one variant, and none of
//! them is retried internally. Variants carry a human-readable message rather
//! than the underlying error value so the enum stays `Send + Sync + 'static`
//! regardless of which layer (URL parsing, rustls, sockets) produced it.

use thiserror::Error;

/// Errors returned by [`crate::SecureClient`].
#[derive(Debug, Error)]
pub enum Error {
    /// The URL is malformed, has no host, or does not use the `https` scheme.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client certificate or key is unreadable, malformed, or the key
    /// does not belong to the certificate.
    #[error("client credential error: {0}")]
    Credential(String),

    /// Name resolution, TCP connect and TLS handshake did not finish within
    /// `connect_timeout`.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The exchange did not finish within `overall_timeout`.
    #[error("request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    /// DNS failure, refused or reset connection, or a malformed response.
    #[error("network error: {0}")]
    Network(String),

    /// The TLS layer failed, including the server rejecting our certificate
    /// and, with verification enabled, the server certificate being rejected.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the two deadline variants.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ConnectTimeout(_) | Error::RequestTimeout(_))
    }
}
