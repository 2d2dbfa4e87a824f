//! Per-call configuration for [`crate::SecureClient`].
//!
//! # Design
//! `SendOptions` can be built in code through its builder methods or loaded
//! from JSON. The JSON form uses camelCase keys and expresses timeouts in
//! (fractional) seconds; any key left out keeps its default:
//!
//! ```json
//! { "connectTimeout": 15, "overallTimeout": 60, "insecureSkipVerify": false }
//! ```
//!
//! Server verification is on unless `insecure_skip_verify` is set.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Default bound on TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on the whole exchange, connect time included.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts, verification policy and extra headers for one call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SendOptions {
    #[serde(deserialize_with = "duration_from_secs")]
    pub connect_timeout: Duration,

    #[serde(deserialize_with = "duration_from_secs")]
    pub overall_timeout: Duration,

    /// Accept any server certificate, skipping chain-of-trust and hostname
    /// checks.
    ///
    /// **Warning:** with this set, the call succeeds against a server whose
    /// certificate is expired, self-signed, or issued for another host. Only
    /// use it against test servers whose certificate you inspect by hand.
    pub insecure_skip_verify: bool,

    /// PEM-encoded trust anchors added to the built-in web PKI roots.
    pub extra_root_certificates: Vec<String>,

    /// Extra request headers. `Host`, `Content-Length` and `Connection` are
    /// always set by the client and must not appear here.
    pub headers: Vec<(String, String)>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            insecure_skip_verify: false,
            extra_root_certificates: Vec::new(),
            headers: Vec::new(),
        }
    }
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: SendOptions = serde_json::from_str(json)
            .map_err(|e| Error::InvalidRequest(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// See the warning on [`SendOptions::insecure_skip_verify`].
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn add_root_certificate(mut self, pem: impl Into<String>) -> Self {
        self.extra_root_certificates.push(pem.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the server's chain and hostname will be checked.
    pub fn verifies_server_identity(&self) -> bool {
        !self.insecure_skip_verify
    }

    /// Reject zero timeouts and headers the client manages itself.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() || self.overall_timeout.is_zero() {
            return Err(Error::InvalidRequest("timeouts must be non-zero".to_string()));
        }
        for (name, value) in &self.headers {
            if RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r)) {
                return Err(Error::InvalidRequest(format!(
                    "header {name:?} is set by the client"
                )));
            }
            if !is_token(name) || value.contains(['\r', '\n']) {
                return Err(Error::InvalidRequest(format!("invalid header {name:?}")));
            }
        }
        Ok(())
    }
}

const RESERVED_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
