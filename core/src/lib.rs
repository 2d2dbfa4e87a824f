//! Blocking mutual-TLS POST client that reports the server's certificate.
//!
//! # Overview
//! [`SecureClient::send_authenticated`] opens a TLS connection presenting a
//! client certificate, POSTs an opaque body, reads the full response and
//! returns it together with the leaf certificate the server presented. It is
//! meant for checking that a server enforces client-certificate
//! authentication and for inspecting that server's certificate by hand.
//!
//! # Design
//! - One call is one attempt: no retries, no pooling, no shared state.
//! - Credentials and URL are validated before any network I/O.
//! - `connect_timeout` bounds name resolution, TCP connect and handshake;
//!   `overall_timeout` bounds the whole exchange.
//! - Server verification is on by default. [`SendOptions::insecure_skip_verify`]
//!   turns it off and every such call logs a warning.
//! - [`to_display_text`] strips PEM armor for display; it never parses the
//!   certificate.
//!
//! ```no_run
//! use mtls_post_core::{SecureClient, SendOptions};
//!
//! # fn main() -> Result<(), mtls_post_core::Error> {
//! let cert = std::fs::read("rgmclient.crt").unwrap_or_default();
//! let key = std::fs::read("rgmclient.key").unwrap_or_default();
//! let client = SecureClient::new(
//!     SendOptions::new().header("Content-Type", "application/json"),
//! );
//! let response = client.send_authenticated(
//!     "https://127.0.0.1:44325/sendmail",
//!     br#"{"sendmail":{}}"#,
//!     &cert,
//!     &key,
//! )?;
//! println!("{}", response.peer_certificate.display_text());
//! # Ok(())
//! # }
//! ```

pub mod certificate;
pub mod client;
pub mod credentials;
pub mod error;
pub mod http;
pub mod options;
pub mod resolve;
pub mod tls;
pub mod verifier;

pub use certificate::{to_compact_text, to_display_text, PeerCertificate};
pub use client::{send_authenticated, AuthenticatedResponse, SecureClient};
pub use credentials::ClientIdentity;
pub use error::{Error, Result};
pub use http::{HttpRequest, HttpResponse};
pub use options::SendOptions;
pub use resolve::{Resolve, SystemResolver};
